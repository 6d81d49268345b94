//! An asynchronous SOCKS5 protocol engine built on Tokio.
//!
//! This crate implements the SOCKS5 protocol (RFC 1928) together with the
//! username/password subnegotiation (RFC 1929), for both sides of a proxy:
//!
//! - a pure wire codec for every message ([`msg`], [`auth`], [`conn`], [`parse`]),
//! - a [`Connection`] that runs method negotiation and authentication exactly
//!   once, in either the initiating or the responding role,
//! - a pluggable [`Selector`] deciding which method to use and running its
//!   subnegotiation,
//! - a [`ServerHandler`] executing `CONNECT` and `BIND` requests,
//! - a generic [`relay`] pumping bytes between two streams.
//!
//! **`UDP ASSOCIATE` is not supported.** Requests carrying it are answered
//! with `Command not supported`.
//!
//! ```no_run
//! use socks5_engine::Credentials;
//! use socks5_engine::server::{Server, ServerHandler, ServerSelector};
//!
//! # async fn run() -> Result<(), socks5_engine::SocksError> {
//! let server = Server::bind("127.0.0.1:1080").await?;
//! let users = vec![Credentials::new("admin", Some("admin"))];
//! server.serve(ServerHandler::new(ServerSelector::new(users))).await
//! # }
//! ```

use std::fmt;

pub mod auth;
pub mod client;
pub mod conn;
pub mod error;
pub mod handshake;
pub mod msg;
pub mod parse;
pub mod pool;
pub mod relay;
pub mod selector;
pub mod server;

pub use auth::reply::{AuthReply, AuthStatus};
pub use auth::request::AuthRequest;
pub use conn::reply::{Rep, Reply};
pub use conn::request::{CMD, Request};
pub use error::SocksError;
pub use handshake::{Connection, Role};
pub use msg::message::{MethodList, MethodSelection};
pub use msg::method::{FixedMethod, Method};
pub use parse::AddrPort;
pub use relay::relay;
pub use selector::{AsyncStream, BoxStream, Credentials, Selector};
pub use server::ServerHandler;

/// The SOCKS protocol version carried in every `VER` field (`0x05`).
pub const SOCKS5_VERSION: u8 = 0x05;

/// The username/password subnegotiation version (`0x01`, RFC 1929).
pub const USERPASS_VERSION: u8 = 0x01;

/// Represents the address type in SOCKS5 messages.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ATYP {
    /// IPv4 address
    V4 = 0x01,
    /// Domain name
    DomainName = 0x03,
    /// IPv6 address
    V6 = 0x04,
}

impl ATYP {
    /// Parses an `ATYP` byte.
    pub fn from_u8(byte: u8) -> Result<Self, SocksError> {
        match byte {
            0x01 => Ok(ATYP::V4),
            0x03 => Ok(ATYP::DomainName),
            0x04 => Ok(ATYP::V6),
            other => Err(SocksError::AddressTypeUnsupported(other)),
        }
    }
}

impl fmt::Display for ATYP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ATYP::V4 => write!(f, "IPv4"),
            ATYP::V6 => write!(f, "IPv6"),
            ATYP::DomainName => write!(f, "Domain"),
        }
    }
}
