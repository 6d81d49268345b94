//! Requests and replies exchanged after negotiation (RFC 1928 §4, §6).

pub mod reply;
pub mod request;
