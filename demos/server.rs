//! A SOCKS5 proxy server.
//!
//! `SOCKS5_LISTEN` sets the listen address (default `127.0.0.1:1080`).
//! `SOCKS5_USERS` is a comma-separated list of `user:pass` entries; when it is
//! unset or empty every client is let in without authentication.

use std::env;

use socks5_engine::Credentials;
use socks5_engine::error::SocksError;
use socks5_engine::server::{Server, ServerHandler, ServerSelector};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), SocksError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    // Both IPv4 and IPv6 work
    let listen = env::var("SOCKS5_LISTEN").unwrap_or_else(|_| "127.0.0.1:1080".to_string());
    let users: Vec<Credentials> = env::var("SOCKS5_USERS")
        .unwrap_or_default()
        .split(',')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| entry.parse().ok())
        .collect();

    if users.is_empty() {
        info!("no users configured, authentication disabled");
    } else {
        info!("{} user(s) configured", users.len());
    }

    let server = Server::bind(listen.as_str()).await?;
    server
        .serve(ServerHandler::new(ServerSelector::new(users)))
        .await
}
