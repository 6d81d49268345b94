//! SOCKS5 handshake messages (RFC 1928).
//!
//! This module defines the messages exchanged during the initial
//! client–server handshake:
//!
//! - [`MethodList`] → sent by the client to advertise supported
//!   authentication methods.
//! - [`MethodSelection`] → sent by the server to choose one method.
//!
//! These are defined in [RFC 1928, section 3](https://www.rfc-editor.org/rfc/rfc1928#section-3).

use tokio::io::{AsyncRead, AsyncReadExt};

use super::method::*;
use crate::SOCKS5_VERSION;
use crate::error::SocksError;

/// Client's version/methods message.
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// - `VER`: SOCKS version (`0x05`).
/// - `NMETHODS`: number of methods that follow.
/// - `METHODS`: list of supported authentication methods.
///
/// At most 255 methods are encoded; any beyond that are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodList {
    /// The list of authentication methods supported by the client.
    pub methods: Vec<Method>,
}

impl MethodList {
    /// Creates a new [`MethodList`] with the given supported methods.
    ///
    /// # Example
    /// ```
    /// use socks5_engine::msg::message::MethodList;
    /// use socks5_engine::msg::method::Method;
    ///
    /// let msg = MethodList::new(vec![Method::NO_AUTH]);
    /// assert_eq!(msg.to_bytes(), [0x05, 0x01, 0x00]);
    /// ```
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }

    /// Serializes the list as `VER | NMETHODS | METHODS`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.methods.len().min(u8::MAX as usize);
        let mut buf = Vec::with_capacity(2 + count);
        buf.push(SOCKS5_VERSION);
        buf.push(count as u8);
        buf.extend(self.methods.iter().take(count).map(|m| m.to_u8()));
        buf
    }

    /// Reads `VER | NMETHODS` and then exactly `NMETHODS` method bytes.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).await?;
        if head[0] != SOCKS5_VERSION {
            return Err(SocksError::BadVersion(head[0]));
        }

        let mut buf = vec![0u8; 2 + head[1] as usize];
        buf[..2].copy_from_slice(&head);
        reader.read_exact(&mut buf[2..]).await?;
        Self::try_from(&buf[..])
    }
}

impl TryFrom<&[u8]> for MethodList {
    type Error = SocksError;

    /// Attempts to parse a [`MethodList`] from raw bytes.
    ///
    /// Returns an error if:
    /// - the buffer is shorter than 2 bytes
    /// - the version is not `0x05`
    /// - the buffer does not contain the declared number of methods
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::ShortRead("method list"));
        }

        let ver = bytes[0];
        if ver != SOCKS5_VERSION {
            return Err(SocksError::BadVersion(ver));
        }

        let nmethods = bytes[1] as usize;
        let raw = bytes
            .get(2..2 + nmethods)
            .ok_or(SocksError::ShortRead("method list"))?;

        let methods = raw.iter().copied().map(Method::from_u8).collect();
        Ok(Self { methods })
    }
}

/// Server's method selection message.
///
/// ```text
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
///
/// - `VER`: SOCKS version (`0x05`).
/// - `METHOD`: the method chosen by the server, or `0xFF`
///   if none are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSelection {
    /// The authentication method selected by the server.
    pub method: Method,
}

impl MethodSelection {
    /// Creates a new [`MethodSelection`] with the given method.
    ///
    /// # Example
    /// ```
    /// use socks5_engine::msg::message::MethodSelection;
    /// use socks5_engine::msg::method::Method;
    ///
    /// let sel = MethodSelection::new(Method::NO_AUTH);
    /// assert_eq!(sel.to_bytes(), [0x05, 0x00]);
    /// ```
    pub fn new(method: Method) -> Self {
        Self { method }
    }

    /// Serializes this [`MethodSelection`] into a 2-byte array.
    pub fn to_bytes(&self) -> [u8; 2] {
        [SOCKS5_VERSION, self.method.to_u8()]
    }

    /// Reads exactly `VER | METHOD`.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await?;
        Self::try_from(&buf[..])
    }
}

impl TryFrom<&[u8]> for MethodSelection {
    type Error = SocksError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::ShortRead("method selection"));
        }

        let ver = bytes[0];
        if ver != SOCKS5_VERSION {
            return Err(SocksError::BadVersion(ver));
        }

        Ok(Self {
            method: Method::from_u8(bytes[1]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_list_preserves_length_and_order() {
        for len in [0usize, 1, 2, 17, 255] {
            let methods: Vec<Method> = (0..len).map(|i| Method::from_u8(i as u8)).collect();
            let list = MethodList::new(methods.clone());
            let bytes = list.to_bytes();
            assert_eq!(bytes[1] as usize, len);

            let decoded = MethodList::try_from(&bytes[..]).unwrap();
            assert_eq!(decoded.methods, methods);
        }
    }

    #[test]
    fn method_list_caps_at_255_entries() {
        let list = MethodList::new(vec![Method::NO_AUTH; 300]);
        let bytes = list.to_bytes();
        assert_eq!(bytes[1], 255);
        assert_eq!(bytes.len(), 2 + 255);
    }

    #[test]
    fn method_list_rejects_bad_input() {
        assert!(matches!(
            MethodList::try_from(&[0x04, 0x01, 0x00][..]),
            Err(SocksError::BadVersion(4))
        ));
        assert!(matches!(
            MethodList::try_from(&[0x05][..]),
            Err(SocksError::ShortRead(_))
        ));
        assert!(matches!(
            MethodList::try_from(&[0x05, 0x03, 0x00][..]),
            Err(SocksError::ShortRead(_))
        ));
    }

    #[test]
    fn method_selection_checks_version() {
        let sel = MethodSelection::try_from(&[0x05, 0x02][..]).unwrap();
        assert_eq!(sel.method, Method::USER_PASS);
        assert!(matches!(
            MethodSelection::try_from(&[0x01, 0x00][..]),
            Err(SocksError::BadVersion(1))
        ));
    }

    #[tokio::test]
    async fn method_list_read_from_stream() {
        let bytes = [0x05, 0x02, 0x00, 0x02, 0xAA];
        let mut reader = &bytes[..];
        let list = MethodList::read_from(&mut reader).await.unwrap();
        assert_eq!(list.methods, vec![Method::NO_AUTH, Method::USER_PASS]);
        assert_eq!(reader, &[0xAAu8][..]);
    }

    #[tokio::test]
    async fn method_list_read_from_rejects_version_before_reading_methods() {
        let bytes = [0x04, 0x09];
        let mut reader = &bytes[..];
        assert!(matches!(
            MethodList::read_from(&mut reader).await,
            Err(SocksError::BadVersion(4))
        ));
    }
}
