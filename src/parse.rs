//! SOCKS5 address and port encoding.
//!
//! This module defines [`AddrPort`], a destination or bound address and port
//! (IPv4, IPv6, or domain), together with its wire codec.
//!
//! The address formats are defined in
//! [RFC 1928 §5, "Addressing"](<https://www.rfc-editor.org/rfc/rfc1928#section-5>):
//!
//! ```text
//! +------+----------+----------+
//! | ATYP |   ADDR   |   PORT   |
//! +------+----------+----------+
//! |  1   | Variable |    2     |
//! +------+----------+----------+
//! ```
//!
//! Example usage:
//! ```rust
//! use socks5_engine::parse::AddrPort;
//!
//! // Example: IPv4 address 127.0.0.1:8080
//! let buf = [0x01, 127, 0, 0, 1, 0x1F, 0x90];
//! let (addr, used) = AddrPort::decode(&buf).unwrap();
//! assert_eq!(addr.to_string(), "127.0.0.1:8080");
//! assert_eq!(used, 7);
//! ```

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::lookup_host;

use crate::ATYP;
use crate::error::SocksError;

/// Longest domain name that fits the one-byte length prefix.
pub const MAX_DOMAIN_LEN: usize = 255;

/// Represents a destination address and port.
///
/// SOCKS5 requests and replies contain an address field that may be:
/// - An IPv4 address (`ATYP = 0x01`).
/// - An IPv6 address (`ATYP = 0x04`).
/// - A domain name (`ATYP = 0x03`), which is represented here as [`AddrPort::Domain`].
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum AddrPort {
    /// An IPv4 address and port.
    V4(Ipv4Addr, u16),

    /// An IPv6 address and port.
    V6(Ipv6Addr, u16),

    /// A domain name and port.
    Domain(String, u16),
}

impl fmt::Display for AddrPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrPort::V4(ip, port) => write!(f, "{}:{}", ip, port),
            AddrPort::V6(ip, port) => write!(f, "[{}]:{}", ip, port),
            AddrPort::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for AddrPort {
    fn from(addr: SocketAddr) -> Self {
        AddrPort::from_ip(addr.ip(), addr.port())
    }
}

impl AddrPort {
    /// Builds an address of the given type from a textual host.
    ///
    /// # Errors
    ///
    /// [`SocksError::InvalidAddress`] if `host` does not parse as an address of
    /// type `atyp`, or if a domain name is longer than 255 bytes.
    pub fn new(atyp: ATYP, host: &str, port: u16) -> Result<Self, SocksError> {
        let invalid = || SocksError::InvalidAddress(format!("{host} is not a valid {atyp} host"));
        match atyp {
            ATYP::V4 => host
                .parse::<Ipv4Addr>()
                .map(|ip| AddrPort::V4(ip, port))
                .map_err(|_| invalid()),
            ATYP::V6 => host
                .parse::<Ipv6Addr>()
                .map(|ip| AddrPort::V6(ip, port))
                .map_err(|_| invalid()),
            ATYP::DomainName => {
                if host.len() > MAX_DOMAIN_LEN || !host.is_ascii() {
                    return Err(invalid());
                }
                Ok(AddrPort::Domain(host.to_string(), port))
            }
        }
    }

    /// Builds an IP address of the matching family.
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        match ip {
            IpAddr::V4(ip) => AddrPort::V4(ip, port),
            IpAddr::V6(ip) => AddrPort::V6(ip, port),
        }
    }

    /// The conventional "no address" value, `0.0.0.0:0`.
    pub fn zero() -> Self {
        AddrPort::V4(Ipv4Addr::UNSPECIFIED, 0)
    }

    /// The address type (`ATYP`) this value is encoded with.
    pub fn atyp(&self) -> ATYP {
        match self {
            AddrPort::V4(..) => ATYP::V4,
            AddrPort::V6(..) => ATYP::V6,
            AddrPort::Domain(..) => ATYP::DomainName,
        }
    }

    /// The host part, formatted as text.
    pub fn host(&self) -> String {
        match self {
            AddrPort::V4(ip, _) => ip.to_string(),
            AddrPort::V6(ip, _) => ip.to_string(),
            AddrPort::Domain(domain, _) => domain.clone(),
        }
    }

    /// The port.
    pub fn port(&self) -> u16 {
        match self {
            AddrPort::V4(_, port) | AddrPort::V6(_, port) | AddrPort::Domain(_, port) => *port,
        }
    }

    /// Returns the same address with its host replaced by `ip`.
    pub fn with_ip(&self, ip: IpAddr) -> Self {
        AddrPort::from_ip(ip, self.port())
    }

    /// Resolves the address to a socket address, looking up domain names.
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        match self {
            AddrPort::V4(ip, port) => Ok(SocketAddr::new(IpAddr::V4(*ip), *port)),
            AddrPort::V6(ip, port) => Ok(SocketAddr::new(IpAddr::V6(*ip), *port)),
            AddrPort::Domain(domain, port) => lookup_host((domain.as_str(), *port))
                .await?
                .next()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no addresses found for {domain}"),
                    )
                }),
        }
    }

    /// Appends the wire form `ATYP | ADDR | PORT` to `buf`.
    ///
    /// # Errors
    ///
    /// [`SocksError::InvalidAddress`] for a domain name that is not ASCII or is
    /// longer than 255 bytes; nothing is appended in that case.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), SocksError> {
        if let AddrPort::Domain(name, _) = self {
            check_domain(name.as_bytes())?;
        }
        buf.push(self.atyp() as u8);
        match self {
            AddrPort::V4(addr, port) => {
                buf.extend_from_slice(&addr.octets());
                buf.extend_from_slice(&port.to_be_bytes());
            }
            AddrPort::V6(addr, port) => {
                buf.extend_from_slice(&addr.octets());
                buf.extend_from_slice(&port.to_be_bytes());
            }
            AddrPort::Domain(name, port) => {
                buf.push(name.len() as u8);
                buf.extend_from_slice(name.as_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
            }
        }
        Ok(())
    }

    /// Serializes the address into its wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SocksError> {
        let mut buf = Vec::with_capacity(1 + 1 + MAX_DOMAIN_LEN + 2);
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Parses an address starting at the `ATYP` byte.
    ///
    /// Returns the address and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// - [`SocksError::ShortRead`] if `buf` ends before the address does.
    /// - [`SocksError::AddressTypeUnsupported`] if `ATYP` is not 1, 3 or 4.
    /// - [`SocksError::InvalidAddress`] if a domain name is not ASCII.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), SocksError> {
        let (&atyp, rest) = buf.split_first().ok_or(SocksError::ShortRead("address"))?;
        let (addr, used) = match ATYP::from_u8(atyp)? {
            ATYP::V4 => {
                let raw: [u8; 4] = take(rest, 0)?;
                let port = u16::from_be_bytes(take(rest, 4)?);
                (AddrPort::V4(Ipv4Addr::from(raw), port), 6)
            }
            ATYP::V6 => {
                let raw: [u8; 16] = take(rest, 0)?;
                let port = u16::from_be_bytes(take(rest, 16)?);
                (AddrPort::V6(Ipv6Addr::from(raw), port), 18)
            }
            ATYP::DomainName => {
                let len = *rest.first().ok_or(SocksError::ShortRead("address"))? as usize;
                let name = rest
                    .get(1..1 + len)
                    .ok_or(SocksError::ShortRead("address"))?;
                let port = u16::from_be_bytes(take(rest, 1 + len)?);
                check_domain(name)?;
                let domain = String::from_utf8_lossy(name).into_owned();
                (AddrPort::Domain(domain, port), 1 + len + 2)
            }
        };
        Ok((addr, 1 + used))
    }

    /// Reads exactly one encoded address from `reader`.
    ///
    /// The `ATYP` byte (and for domain names the length byte) is read first to
    /// learn how many bytes follow.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let atyp = reader.read_u8().await?;
        let mut buf = vec![atyp];
        let body = match ATYP::from_u8(atyp)? {
            ATYP::V4 => 4 + 2,
            ATYP::V6 => 16 + 2,
            ATYP::DomainName => {
                let len = reader.read_u8().await?;
                buf.push(len);
                len as usize + 2
            }
        };
        let start = buf.len();
        buf.resize(start + body, 0);
        reader.read_exact(&mut buf[start..]).await?;

        let (addr, _) = AddrPort::decode(&buf)?;
        Ok(addr)
    }
}

fn check_domain(name: &[u8]) -> Result<(), SocksError> {
    if name.len() > MAX_DOMAIN_LEN || !name.is_ascii() {
        return Err(SocksError::InvalidAddress(format!(
            "domain name of {} bytes is not a short ASCII name",
            name.len()
        )));
    }
    Ok(())
}

fn take<const N: usize>(buf: &[u8], at: usize) -> Result<[u8; N], SocksError> {
    buf.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(SocksError::ShortRead("address"))
}
