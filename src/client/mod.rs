//! The initiating side: dial a proxy, negotiate, and issue requests.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::conn::reply::{Rep, Reply};
use crate::conn::request::{CMD, Request};
use crate::error::SocksError;
use crate::handshake::Connection;
use crate::parse::AddrPort;
use crate::selector::Selector;

pub mod selector;

pub use selector::ClientSelector;

/// How [`dial`] reaches and negotiates with the proxy.
#[derive(Clone, Default)]
pub struct DialOptions {
    /// Authentication policy; `None` offers `NO AUTH` only.
    pub selector: Option<Arc<dyn Selector>>,
    /// Limit on establishing the TCP connection.
    pub timeout: Option<Duration>,
}

impl DialOptions {
    pub fn with_selector(mut self, selector: impl Selector + 'static) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Connects to the proxy at `proxy` and completes the handshake.
///
/// The TCP stream is closed if the handshake fails.
pub async fn dial(
    proxy: impl ToSocketAddrs,
    options: DialOptions,
) -> Result<Connection, SocksError> {
    let connecting = TcpStream::connect(proxy);
    let stream = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(io::Error::from)??,
        None => connecting.await?,
    };
    let local = stream.local_addr()?;
    let peer = stream.peer_addr()?;

    let conn = Connection::client(stream, options.selector).with_addrs(local, peer);
    let method = conn.handshake().await?;
    debug!(proxy = %peer, %method, "connected to proxy");
    Ok(conn)
}

/// Writes `request` and reads the server's reply, whatever its status.
pub async fn send_request(conn: &mut Connection, request: &Request) -> Result<Reply, SocksError> {
    request.write_to(conn).await?;
    Reply::read_from(conn).await
}

/// Asks the proxy to connect to `target`.
///
/// On success the connection carries the target's data from here on.
pub async fn connect(conn: &mut Connection, target: AddrPort) -> Result<Reply, SocksError> {
    let reply = send_request(conn, &Request::new(CMD::Connect, target)).await?;
    accepted(reply)
}

/// Asks the proxy to listen on `addr` and returns the first reply, which
/// names the address the proxy listens on. [`read_reply`] then waits for the
/// inbound connection.
pub async fn bind(conn: &mut Connection, addr: AddrPort) -> Result<Reply, SocksError> {
    let reply = send_request(conn, &Request::new(CMD::Bind, addr)).await?;
    accepted(reply)
}

/// Reads one more reply, e.g. the second reply of a BIND.
pub async fn read_reply(conn: &mut Connection) -> Result<Reply, SocksError> {
    accepted(Reply::read_from(conn).await?)
}

fn accepted(reply: Reply) -> Result<Reply, SocksError> {
    match reply.rep {
        Rep::Succeeded => Ok(reply),
        rep => Err(SocksError::Rejected(rep)),
    }
}
