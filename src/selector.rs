//! The pluggable authentication policy shared by both roles.
//!
//! A [`Selector`] answers two questions during the handshake: which methods
//! to offer or accept, and how to run the subnegotiation for the method that
//! was chosen. Subnegotiation receives the raw stream by value and hands back
//! the stream to use from then on, so a method that wraps the transport (for
//! example to add encryption) simply returns the wrapper.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SocksError;
use crate::msg::method::Method;

/// Any bidirectional byte stream the engine can drive.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// An owned, type-erased stream.
pub type BoxStream = Box<dyn AsyncStream>;

/// Method choice and subnegotiation for one side of the handshake.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Methods advertised by the initiating role.
    fn methods(&self) -> Vec<Method>;

    /// Picks the method to use from the peer's offer (responding role).
    fn select(&self, offered: &[Method]) -> Method;

    /// Runs the subnegotiation for `method` and returns the stream to use
    /// afterwards.
    async fn on_selected(&self, method: Method, stream: BoxStream)
    -> Result<BoxStream, SocksError>;
}

/// A username with an optional password.
///
/// Parsed from `"user:pass"` or `"user"`; everything after the first `:` is
/// the password.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    /// Credentials for `username`; `None` leaves the password unset.
    pub fn new(username: impl Into<String>, password: Option<impl Into<String>>) -> Self {
        Self {
            username: username.into(),
            password: password.map(Into::into),
        }
    }

    /// The password, or the empty string when none is set.
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}

impl FromStr for Credentials {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once(':') {
            Some((username, password)) => Credentials::new(username, Some(password)),
            None => Credentials::new(s, None::<String>),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
