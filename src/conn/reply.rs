//! SOCKS5 server connection reply (RFC 1928 §6).
//!
//! After processing a request, the server replies with:
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//!
//! o VER       - protocol version: X'05'
//! o REP       - reply field, see below
//! o RSV       - reserved, must be 0x00
//! o ATYP      - address type of BND.ADDR
//! o BND.ADDR  - server bound address
//! o BND.PORT  - server bound port in network byte order
//!
//! The BND fields are meaningful in BIND, but are conventionally zero otherwise.
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::SOCKS5_VERSION;
use crate::error::SocksError;
use crate::parse::AddrPort;

/// Reply codes (`REP`) for SOCKS5 connection replies (RFC 1928 §6).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rep {
    /// 0x00 - Succeeded
    Succeeded = 0x00,
    /// 0x01 - General SOCKS server failure
    GeneralFailure = 0x01,
    /// 0x02 - Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// 0x03 - Network unreachable
    NetworkUnreachable = 0x03,
    /// 0x04 - Host unreachable
    HostUnreachable = 0x04,
    /// 0x05 - Connection refused by destination host
    ConnectionRefused = 0x05,
    /// 0x06 - TTL expired
    TTLExpired = 0x06,
    /// 0x07 - Command not supported
    CommandNotSupported = 0x07,
    /// 0x08 - Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl Rep {
    pub fn from_u8(byte: u8) -> Result<Self, SocksError> {
        match byte {
            0x00 => Ok(Rep::Succeeded),
            0x01 => Ok(Rep::GeneralFailure),
            0x02 => Ok(Rep::ConnectionNotAllowed),
            0x03 => Ok(Rep::NetworkUnreachable),
            0x04 => Ok(Rep::HostUnreachable),
            0x05 => Ok(Rep::ConnectionRefused),
            0x06 => Ok(Rep::TTLExpired),
            0x07 => Ok(Rep::CommandNotSupported),
            0x08 => Ok(Rep::AddressTypeNotSupported),
            other => Err(SocksError::UnknownReply(other)),
        }
    }
}

/// Represents a SOCKS5 server reply (RFC 1928 §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply field (`REP`): success or error status.
    pub rep: Rep,
    /// Bound address and port (`ATYP`, `BND.ADDR`, `BND.PORT`).
    pub bnd: AddrPort,
}

impl Reply {
    /// Creates a new `Reply`.
    pub fn new(rep: Rep, bnd: AddrPort) -> Self {
        Self { rep, bnd }
    }

    /// A reply carrying the zero address `0.0.0.0:0`.
    pub fn status(rep: Rep) -> Self {
        Self::new(rep, AddrPort::zero())
    }

    /// Serializes the reply into the SOCKS5 wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SocksError> {
        let mut buf = vec![SOCKS5_VERSION, self.rep as u8, 0x00];
        self.bnd.encode(&mut buf)?;
        Ok(buf)
    }

    /// Reads one reply, header first, then exactly the bound address.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 3];
        reader.read_exact(&mut head).await?;
        if head[0] != SOCKS5_VERSION {
            return Err(SocksError::BadVersion(head[0]));
        }

        let bnd = AddrPort::read_from(reader).await?;
        let rep = Rep::from_u8(head[1])?;
        Ok(Self { rep, bnd })
    }

    /// Writes and flushes the reply. Nothing is written if the bound address
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

impl TryFrom<&[u8]> for Reply {
    type Error = SocksError;

    /// Parses a SOCKS5 connection reply from raw bytes.
    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() < 4 {
            return Err(SocksError::ShortRead("reply"));
        }

        let ver = buf[0];
        if ver != SOCKS5_VERSION {
            return Err(SocksError::BadVersion(ver));
        }

        let rep = Rep::from_u8(buf[1])?;
        let (bnd, _) = AddrPort::decode(&buf[3..])?;
        Ok(Reply { rep, bnd })
    }
}
