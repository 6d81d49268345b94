use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::conn::reply::Rep;

/// Represents the possible errors raised by the SOCKS5 engine.
///
/// The type is `Clone` so a cached handshake outcome can be returned to every
/// caller; I/O errors are shared behind an [`Arc`] for that reason.
#[derive(Debug, Clone, Error)]
pub enum SocksError {
    // ===== Wire format =====
    /// Occurs when a `VER` byte on the wire is not the expected protocol version.
    #[error("unsupported version: {0}")]
    BadVersion(u8),

    /// Occurs when a message is truncated.
    #[error("{0} too short")]
    ShortRead(&'static str),

    /// Occurs when an `ATYP` byte is not one of IPv4, domain name or IPv6.
    #[error("address type not supported: {0}")]
    AddressTypeUnsupported(u8),

    /// Occurs when a host cannot be represented in the requested address form.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Occurs when a reply carries a status byte outside the RFC 1928 table.
    #[error("unknown reply status: {0}")]
    UnknownReply(u8),

    // ===== Negotiation =====
    /// Occurs when method negotiation ends with "no acceptable methods".
    #[error("no acceptable authentication method")]
    BadMethod,

    /// Occurs when a username or password is too long for the wire or is not
    /// valid UTF-8.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Occurs when the username/password subnegotiation fails.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    // ===== Commands =====
    /// Occurs when a request carries a command the server does not execute.
    #[error("unsupported command: {0}")]
    CommandUnsupported(u8),

    /// Occurs when the target of CONNECT or BIND cannot be dialed or bound.
    #[error("target {addr} unreachable: {source}")]
    TargetUnreachable {
        addr: String,
        source: Arc<io::Error>,
    },

    /// Occurs on the client side when the server answers with a negative reply.
    #[error("request rejected by server: {0:?}")]
    Rejected(Rep),

    // ===== General =====
    /// Occurs when an I/O error happens on the underlying stream.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl SocksError {
    pub(crate) fn unreachable(addr: impl ToString, source: io::Error) -> Self {
        SocksError::TargetUnreachable {
            addr: addr.to_string(),
            source: Arc::new(source),
        }
    }
}

impl From<io::Error> for SocksError {
    fn from(err: io::Error) -> Self {
        SocksError::Io(Arc::new(err))
    }
}

impl From<SocksError> for io::Error {
    fn from(err: SocksError) -> Self {
        match err {
            SocksError::Io(inner) => io::Error::new(inner.kind(), SocksError::Io(inner)),
            other => io::Error::other(other),
        }
    }
}
