//! Authentication reply message for SOCKS5 username/password authentication.
//!
//! Defined in [RFC 1929, section 2](https://www.rfc-editor.org/rfc/rfc1929#section-2).
//!
//! After a client sends an authentication request, the server replies with
//! a 2–byte message:
//!
//! ```text
//! +----+--------+
//! |VER | STATUS |
//! +----+--------+
//! |  1 |   1    |
//! +----+--------+
//!
//! o VER    - the version of the subnegotiation (always 0x01)
//! o STATUS - 0x00 for success, any non-zero value indicates failure
//! ```
//!
//! If the status is non-zero, the client MUST close the connection.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::USERPASS_VERSION;
use crate::error::SocksError;

/// Represents the status of the authentication, as per RFC 1929.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// Authentication succeeded (`STATUS = 0x00`).
    Success = 0x00,
    /// Authentication failed (any non-zero `STATUS`).
    Failure = 0x01,
}

/// Represents an authentication reply sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthReply {
    /// Authentication protocol version (`VER`), always `0x01` (RFC 1929 §2).
    pub ver: u8,
    /// The status of the authentication (`STATUS`).
    pub status: AuthStatus,
}

impl AuthReply {
    /// Creates a new `AuthReply` with the given status.
    ///
    /// # Arguments
    ///
    /// * `status` - Authentication outcome (success or failure).
    pub fn new(status: AuthStatus) -> Self {
        Self {
            ver: USERPASS_VERSION,
            status,
        }
    }

    /// Converts the `AuthReply` into its 2–byte wire format.
    ///
    /// Layout: `[VER, STATUS]`.
    pub fn to_bytes(&self) -> [u8; 2] {
        [self.ver, self.status as u8]
    }

    /// Reads exactly `VER | STATUS`.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await?;
        Self::try_from(&buf[..])
    }
}

impl TryFrom<&[u8]> for AuthReply {
    type Error = SocksError;

    /// Parses an authentication reply from a 2–byte buffer.
    ///
    /// # Errors
    /// - [`SocksError::ShortRead`] if the slice is shorter than 2 bytes.
    /// - [`SocksError::BadVersion`] if `VER != 0x01`.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::ShortRead("auth reply"));
        }

        let ver = bytes[0];
        if ver != USERPASS_VERSION {
            return Err(SocksError::BadVersion(ver));
        }

        let status = match bytes[1] {
            0x00 => AuthStatus::Success,
            _ => AuthStatus::Failure,
        };

        Ok(Self { ver, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for status in [AuthStatus::Success, AuthStatus::Failure] {
            let reply = AuthReply::new(status);
            assert_eq!(AuthReply::try_from(&reply.to_bytes()[..]).unwrap(), reply);
        }
    }

    #[test]
    fn any_non_zero_status_is_failure() {
        let reply = AuthReply::try_from(&[0x01, 0x7F][..]).unwrap();
        assert_eq!(reply.status, AuthStatus::Failure);
    }

    #[test]
    fn rejects_socks_version_byte() {
        assert!(matches!(
            AuthReply::try_from(&[0x05, 0x00][..]),
            Err(SocksError::BadVersion(5))
        ));
        assert!(matches!(
            AuthReply::try_from(&[0x01][..]),
            Err(SocksError::ShortRead(_))
        ));
    }
}
