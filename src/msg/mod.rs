//! Method negotiation (RFC 1928 §3).

pub mod message;
pub mod method;
