//! Fetches a page through a SOCKS5 proxy.
//!
//! `SOCKS5_PROXY` is the proxy address (default `127.0.0.1:1080`),
//! `SOCKS5_TARGET` the `host:port` to reach (default `example.com:80`) and
//! `SOCKS5_AUTH` optional `user:pass` credentials.

use std::env;
use std::time::Duration;

use socks5_engine::client::{self, ClientSelector, DialOptions};
use socks5_engine::error::SocksError;
use socks5_engine::{ATYP, AddrPort, Credentials};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), SocksError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    let proxy = env::var("SOCKS5_PROXY").unwrap_or_else(|_| "127.0.0.1:1080".to_string());
    let target = env::var("SOCKS5_TARGET").unwrap_or_else(|_| "example.com:80".to_string());

    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| SocksError::InvalidAddress(target.clone()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| SocksError::InvalidAddress(target.clone()))?;
    let dst = match host.trim_start_matches('[').trim_end_matches(']').parse() {
        Ok(ip) => AddrPort::from_ip(ip, port),
        Err(_) => AddrPort::new(ATYP::DomainName, host, port)?,
    };

    let mut options = DialOptions::default().with_timeout(Duration::from_secs(10));
    if let Ok(auth) = env::var("SOCKS5_AUTH") {
        let Ok(creds) = auth.parse::<Credentials>();
        options = options.with_selector(ClientSelector::with_credentials(creds));
    }

    let mut conn = client::dial(proxy.as_str(), options).await?;
    info!("negotiated {:?} with {}", conn.method(), proxy);

    let reply = client::connect(&mut conn, dst.clone()).await?;
    info!(dest = %dst, bind = %reply.bnd, "connection established");

    let request = format!("GET / HTTP/1.0\r\nHost: {host}\r\n\r\n");
    conn.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    if let Err(e) = conn.read_to_end(&mut response).await {
        warn!("connection closed with error: {e}");
    }
    info!("received {} bytes", response.len());
    if let Some(status) = String::from_utf8_lossy(&response).lines().next() {
        info!("status line: {status}");
    }
    Ok(())
}
