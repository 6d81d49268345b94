//! Username/password subnegotiation (RFC 1929).

pub mod reply;
pub mod request;
