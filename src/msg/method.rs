//! SOCKS5 authentication methods (RFC 1928).
//!
//! This module defines the authentication method identifiers
//! used in the version negotiation phase of the SOCKS5 protocol.
//!
//! - [`FixedMethod`] → reserved values defined in RFC 1928
//! - [`Method`] → general representation, including fixed,
//!   IANA-assigned, and private methods
//!
//! See [RFC 1928, section 3](https://www.rfc-editor.org/rfc/rfc1928#section-3).

use std::fmt;

/// Fixed authentication methods defined in RFC 1928.
///
/// ```text
/// 0x00 → No authentication required
/// 0x01 → GSS-API authentication
/// 0x02 → Username/password authentication
/// 0xFF → No acceptable methods
/// ```
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FixedMethod {
    /// No authentication required (`0x00`).
    NoAuth = 0x00,
    /// GSS-API authentication (`0x01`).
    GssApi = 0x01,
    /// Username/password authentication (`0x02`).
    UserPass = 0x02,
    /// No acceptable methods (`0xFF`).
    NoAcceptable = 0xFF,
}

impl fmt::Display for FixedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FixedMethod::NoAuth => "NO AUTHENTICATION REQUIRED",
            FixedMethod::GssApi => "GSSAPI",
            FixedMethod::UserPass => "USERNAME/PASSWORD",
            FixedMethod::NoAcceptable => "NO ACCEPTABLE METHODS",
        };
        write!(f, "{}", msg)
    }
}

/// Represents any SOCKS5 authentication method.
///
/// This includes:
/// - [`FixedMethod`] values
/// - IANA-assigned methods (`0x03`–`0x7F`)
/// - Private methods (`0x80`–`0xFE`)
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Method {
    /// A fixed, reserved method defined in RFC 1928.
    Fixed(FixedMethod),
    /// An IANA-assigned method (`0x03`–`0x7F`).
    IanaAssigned(u8),
    /// A private-use method (`0x80`–`0xFE`).
    Private(u8),
}

impl Method {
    pub const NO_AUTH: Method = Method::Fixed(FixedMethod::NoAuth);
    pub const GSSAPI: Method = Method::Fixed(FixedMethod::GssApi);
    pub const USER_PASS: Method = Method::Fixed(FixedMethod::UserPass);
    pub const NO_ACCEPTABLE: Method = Method::Fixed(FixedMethod::NoAcceptable);

    /// Converts a [`Method`] into its byte representation.
    pub fn to_u8(self) -> u8 {
        match self {
            Method::Fixed(f) => f as u8,
            Method::IanaAssigned(b) => b,
            Method::Private(b) => b,
        }
    }

    /// Classifies a method byte. Every byte value is a valid method.
    ///
    /// - `0x00`, `0x01`, `0x02`, `0xFF` → [`FixedMethod`]
    /// - `0x03`–`0x7F` → [`Method::IanaAssigned`]
    /// - `0x80`–`0xFE` → [`Method::Private`]
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0x00 => Method::NO_AUTH,
            0x01 => Method::GSSAPI,
            0x02 => Method::USER_PASS,
            0xFF => Method::NO_ACCEPTABLE,
            0x03..=0x7F => Method::IanaAssigned(byte),
            0x80..=0xFE => Method::Private(byte),
        }
    }
}

impl From<FixedMethod> for Method {
    fn from(method: FixedMethod) -> Self {
        Method::Fixed(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Fixed(fm) => write!(f, "{}", fm),
            Method::IanaAssigned(b) => write!(f, "IANA ASSIGNED METHOD 0x{:02X}", b),
            Method::Private(b) => write!(f, "PRIVATE METHOD 0x{:02X}", b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_byte_maps_back_to_itself() {
        for byte in 0..=u8::MAX {
            assert_eq!(Method::from_u8(byte).to_u8(), byte);
        }
    }

    #[test]
    fn ranges_are_classified() {
        assert_eq!(Method::from_u8(0x00), Method::NO_AUTH);
        assert_eq!(Method::from_u8(0x02), Method::USER_PASS);
        assert_eq!(Method::from_u8(0x03), Method::IanaAssigned(0x03));
        assert_eq!(Method::from_u8(0x7F), Method::IanaAssigned(0x7F));
        assert_eq!(Method::from_u8(0x80), Method::Private(0x80));
        assert_eq!(Method::from_u8(0xFE), Method::Private(0xFE));
        assert_eq!(Method::from_u8(0xFF), Method::NO_ACCEPTABLE);
    }

    #[test]
    fn display() {
        assert_eq!(Method::USER_PASS.to_string(), "USERNAME/PASSWORD");
        assert_eq!(Method::Private(0x81).to_string(), "PRIVATE METHOD 0x81");
    }
}
