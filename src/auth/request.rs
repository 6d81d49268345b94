//! Username/password authentication request (RFC 1929 §2).
//!
//! ```text
//! +----+------+----------+------+----------+
//! |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
//! +----+------+----------+------+----------+
//! | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
//! +----+------+----------+------+----------+
//! ```

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::USERPASS_VERSION;
use crate::error::SocksError;

/// Longest username or password that fits the one-byte length prefix.
pub const MAX_FIELD_LEN: usize = 255;

/// Credentials sent by the client after `USERNAME/PASSWORD` was selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Subnegotiation version (`VER`), always `0x01`.
    pub ver: u8,
    pub uname: String,
    pub passwd: String,
}

impl AuthRequest {
    /// Creates a version `0x01` request carrying `uname` and `passwd`.
    pub fn new(uname: impl Into<String>, passwd: impl Into<String>) -> Self {
        Self {
            ver: USERPASS_VERSION,
            uname: uname.into(),
            passwd: passwd.into(),
        }
    }

    /// Serializes the request.
    ///
    /// # Errors
    ///
    /// [`SocksError::InvalidCredentials`] if either field is longer than 255
    /// bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SocksError> {
        let uname = field_bytes("username", &self.uname)?;
        let passwd = field_bytes("password", &self.passwd)?;

        let mut buf = Vec::with_capacity(3 + uname.len() + passwd.len());
        buf.push(self.ver);
        buf.push(uname.len() as u8);
        buf.extend_from_slice(uname);
        buf.push(passwd.len() as u8);
        buf.extend_from_slice(passwd);
        Ok(buf)
    }

    /// Reads one request, using each length prefix to size the next read.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).await?;
        if head[0] != USERPASS_VERSION {
            return Err(SocksError::BadVersion(head[0]));
        }

        let ulen = head[1] as usize;
        let mut buf = vec![0u8; 2 + ulen + 1];
        buf[..2].copy_from_slice(&head);
        reader.read_exact(&mut buf[2..]).await?;

        let plen = buf[2 + ulen] as usize;
        let start = buf.len();
        buf.resize(start + plen, 0);
        reader.read_exact(&mut buf[start..]).await?;

        Self::try_from(&buf[..])
    }
}

impl TryFrom<&[u8]> for AuthRequest {
    type Error = SocksError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::ShortRead("auth request"));
        }

        let ver = bytes[0];
        if ver != USERPASS_VERSION {
            return Err(SocksError::BadVersion(ver));
        }

        let ulen = bytes[1] as usize;
        let uname = bytes
            .get(2..2 + ulen)
            .ok_or(SocksError::ShortRead("auth request"))?;

        let plen_index = 2 + ulen;
        let plen = *bytes
            .get(plen_index)
            .ok_or(SocksError::ShortRead("auth request"))? as usize;
        let passwd = bytes
            .get(plen_index + 1..plen_index + 1 + plen)
            .ok_or(SocksError::ShortRead("auth request"))?;

        Ok(Self {
            ver,
            uname: field_string("username", uname)?,
            passwd: field_string("password", passwd)?,
        })
    }
}

fn field_bytes<'a>(name: &str, value: &'a str) -> Result<&'a [u8], SocksError> {
    if value.len() > MAX_FIELD_LEN {
        return Err(SocksError::InvalidCredentials(format!(
            "{name} is {} bytes, at most {MAX_FIELD_LEN} fit",
            value.len()
        )));
    }
    Ok(value.as_bytes())
}

fn field_string(name: &str, raw: &[u8]) -> Result<String, SocksError> {
    String::from_utf8(raw.to_vec())
        .map_err(|_| SocksError::InvalidCredentials(format!("{name} is not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_layout() {
        let request = AuthRequest::new("admin", "secret123");
        let bytes = request.to_bytes().unwrap();

        assert_eq!(bytes[0], USERPASS_VERSION);
        assert_eq!(bytes[1], 5);
        assert_eq!(&bytes[2..7], b"admin");
        assert_eq!(bytes[7], 9);
        assert_eq!(&bytes[8..17], b"secret123");
    }

    #[test]
    fn decode_round_trips_including_empty_fields() {
        for request in [
            AuthRequest::new("user", "pass"),
            AuthRequest::new("", "pass"),
            AuthRequest::new("user", ""),
            AuthRequest::new("u".repeat(255), "p".repeat(255)),
        ] {
            let decoded = AuthRequest::try_from(&request.to_bytes().unwrap()[..]).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn decode_rejects_bad_version_and_truncation() {
        assert!(matches!(
            AuthRequest::try_from(&[0x05, 0x00, 0x00][..]),
            Err(SocksError::BadVersion(5))
        ));
        assert!(matches!(
            AuthRequest::try_from(&[0x01, 0x04, b'u', b's'][..]),
            Err(SocksError::ShortRead(_))
        ));
        assert!(matches!(
            AuthRequest::try_from(&[0x01, 0x01, b'u', 0x02, b'p'][..]),
            Err(SocksError::ShortRead(_))
        ));
    }

    #[test]
    fn overlong_fields_are_refused() {
        let err = AuthRequest::new("u".repeat(256), "p").to_bytes().unwrap_err();
        assert!(matches!(err, SocksError::InvalidCredentials(m) if m.contains("username")));
        let err = AuthRequest::new("u", "p".repeat(300)).to_bytes().unwrap_err();
        assert!(matches!(err, SocksError::InvalidCredentials(m) if m.contains("password")));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let buf = [0x01, 0x01, 0xFF, 0x01, b'p'];
        assert!(matches!(
            AuthRequest::try_from(&buf[..]),
            Err(SocksError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn read_from_stream() {
        let bytes = AuthRequest::new("alice", "secret").to_bytes().unwrap();
        let mut reader = &bytes[..];
        let request = AuthRequest::read_from(&mut reader).await.unwrap();
        assert_eq!(request.uname, "alice");
        assert_eq!(request.passwd, "secret");
        assert!(reader.is_empty());
    }
}
