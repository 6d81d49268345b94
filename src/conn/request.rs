//! SOCKS5 client connection request (RFC 1928 §4).
//!
//! After negotiation, the client sends a request message:
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//!
//! o VER      - protocol version: X'05'
//! o CMD      - command code:
//!                0x01 = CONNECT
//!                0x02 = BIND
//!                0x03 = UDP ASSOCIATE
//! o RSV      - reserved, must be 0x00
//! o ATYP     - address type of DST.ADDR
//!                0x01 = IPv4 address
//!                0x03 = Domain name
//!                0x04 = IPv6 address
//! o DST.ADDR - destination address
//! o DST.PORT - destination port in network byte order
//! ```

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::SOCKS5_VERSION;
use crate::error::SocksError;
use crate::parse::AddrPort;

/// The command (`CMD`) of a SOCKS5 request (RFC 1928 §4).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CMD {
    /// CONNECT command (0x01): establishes a TCP connection to the target host.
    Connect = 0x01,
    /// BIND command (0x02): accepts one inbound connection on the client's behalf.
    Bind = 0x02,
    /// UDP ASSOCIATE command (0x03): establishes a UDP relay.
    UdpAssociate = 0x03,
}

impl CMD {
    /// Parses a `CMD` byte.
    ///
    /// # Errors
    ///
    /// [`SocksError::CommandUnsupported`] for any byte other than 1, 2 or 3.
    pub fn from_u8(byte: u8) -> Result<Self, SocksError> {
        match byte {
            0x01 => Ok(CMD::Connect),
            0x02 => Ok(CMD::Bind),
            0x03 => Ok(CMD::UdpAssociate),
            other => Err(SocksError::CommandUnsupported(other)),
        }
    }
}

impl fmt::Display for CMD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CMD::Connect => write!(f, "CONNECT"),
            CMD::Bind => write!(f, "BIND"),
            CMD::UdpAssociate => write!(f, "UDP_ASSOCIATE"),
        }
    }
}

/// Represents a SOCKS5 connection request (RFC 1928 §4).
///
/// `VER` and `RSV` are implied: they are always written as `0x05` and `0x00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command (`CMD`): CONNECT, BIND, or UDP ASSOCIATE.
    pub cmd: CMD,
    /// Destination address and port (`ATYP`, `DST.ADDR`, `DST.PORT`).
    pub dst: AddrPort,
}

impl Request {
    /// Creates a new `Request`.
    pub fn new(cmd: CMD, dst: AddrPort) -> Self {
        Self { cmd, dst }
    }

    /// Serializes the request into the SOCKS5 wire format.
    ///
    /// Fails with [`SocksError::InvalidAddress`] when the destination cannot
    /// be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SocksError> {
        let mut buf = vec![SOCKS5_VERSION, self.cmd as u8, 0x00];
        self.dst.encode(&mut buf)?;
        Ok(buf)
    }

    /// Reads one request from `reader`.
    ///
    /// The whole message is consumed before the command byte is checked, so an
    /// unknown command still leaves the stream positioned after the request.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 3];
        reader.read_exact(&mut head).await?;
        if head[0] != SOCKS5_VERSION {
            return Err(SocksError::BadVersion(head[0]));
        }

        let dst = AddrPort::read_from(reader).await?;
        let cmd = CMD::from_u8(head[1])?;
        Ok(Self { cmd, dst })
    }

    /// Writes and flushes the request. Nothing is written if the destination
    /// cannot be encoded.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), SocksError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()?).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SOCKS5 Request {{")?;
        writeln!(f, "  CMD : {}", self.cmd)?;
        writeln!(f, "  ATYP: {}", self.dst.atyp())?;
        writeln!(f, "  DST : {}", self.dst)?;
        write!(f, "}}")
    }
}

impl TryFrom<&[u8]> for Request {
    type Error = SocksError;

    /// Parses a SOCKS5 connection request from raw bytes.
    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() < 4 {
            return Err(SocksError::ShortRead("request"));
        }

        let ver = buf[0];
        if ver != SOCKS5_VERSION {
            return Err(SocksError::BadVersion(ver));
        }

        let (dst, _) = AddrPort::decode(&buf[3..])?;
        let cmd = CMD::from_u8(buf[1])?;
        Ok(Request { cmd, dst })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn connect_request_layout() {
        let request = Request::new(CMD::Connect, AddrPort::V4(Ipv4Addr::new(127, 0, 0, 1), 8080));
        assert_eq!(
            request.to_bytes().unwrap(),
            [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90]
        );
    }

    #[test]
    fn round_trips_every_command() {
        for cmd in [CMD::Connect, CMD::Bind, CMD::UdpAssociate] {
            let request = Request::new(cmd, AddrPort::Domain("example.com".into(), 443));
            let decoded = Request::try_from(&request.to_bytes().unwrap()[..]).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[tokio::test]
    async fn overlong_destination_is_never_written() {
        let request = Request::new(CMD::Connect, AddrPort::Domain("h".repeat(300), 80));
        let mut sink = Vec::new();
        let err = request.write_to(&mut sink).await.unwrap_err();
        assert!(matches!(err, SocksError::InvalidAddress(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn rejects_undefined_address_type() {
        let buf = [0x05, 0x01, 0x00, 0x02, 1, 2, 3, 4, 0, 80];
        assert!(matches!(
            Request::try_from(&buf[..]),
            Err(SocksError::AddressTypeUnsupported(0x02))
        ));
    }

    #[test]
    fn rejects_unknown_command_and_version() {
        let buf = [0x05, 0x09, 0x00, 0x01, 1, 2, 3, 4, 0, 80];
        assert!(matches!(
            Request::try_from(&buf[..]),
            Err(SocksError::CommandUnsupported(0x09))
        ));

        let buf = [0x04, 0x01, 0x00, 0x01, 1, 2, 3, 4, 0, 80];
        assert!(matches!(
            Request::try_from(&buf[..]),
            Err(SocksError::BadVersion(4))
        ));
    }

    #[tokio::test]
    async fn read_from_consumes_unknown_command_fully() {
        let mut bytes = vec![0x05, 0x7E, 0x00, 0x01, 10, 0, 0, 1, 0, 80];
        bytes.push(0xEE);
        let mut reader = &bytes[..];

        let err = Request::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, SocksError::CommandUnsupported(0x7E)));
        assert_eq!(reader, &[0xEEu8][..]);
    }

    #[test]
    fn display_names_command_and_target() {
        let request = Request::new(CMD::Bind, AddrPort::V4(Ipv4Addr::UNSPECIFIED, 0));
        let text = request.to_string();
        assert!(text.contains("BIND"));
        assert!(text.contains("0.0.0.0:0"));
    }
}
