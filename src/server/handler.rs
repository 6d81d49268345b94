//! Command execution for the responding role.
//!
//! After the handshake the server reads one request and carries it out:
//! `CONNECT` dials the target and relays, `BIND` listens for a single inbound
//! connection and relays it back to the client. Every other command is
//! answered with `Command not supported`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

use crate::conn::reply::{Rep, Reply};
use crate::conn::request::{CMD, Request};
use crate::error::SocksError;
use crate::handshake::Connection;
use crate::parse::AddrPort;
use crate::pool::relay_pool;
use crate::relay::relay;
use crate::selector::{AsyncStream, BoxStream, Selector};

/// Backlog of the one-shot BIND listener.
const BIND_BACKLOG: u32 = 1;

/// Client bytes buffered while a BIND waits for its inbound connection.
const MAX_PENDING: usize = 64 * 1024;

/// Opens outbound connections for `CONNECT`.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, addr: &AddrPort) -> io::Result<BoxStream>;
}

/// Dials targets directly over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &AddrPort) -> io::Result<BoxStream> {
        let stream = match addr {
            AddrPort::V4(ip, port) => TcpStream::connect((*ip, *port)).await?,
            AddrPort::V6(ip, port) => TcpStream::connect((*ip, *port)).await?,
            AddrPort::Domain(host, port) => TcpStream::connect((host.as_str(), *port)).await?,
        };
        Ok(Box::new(stream))
    }
}

/// Serves one client connection: handshake, request, then the command.
#[derive(Clone)]
pub struct ServerHandler {
    selector: Option<Arc<dyn Selector>>,
    dialer: Arc<dyn Dialer>,
}

impl Default for ServerHandler {
    /// A handler without a selector: every client gets `NO AUTH`.
    fn default() -> Self {
        Self {
            selector: None,
            dialer: Arc::new(TcpDialer),
        }
    }
}

impl ServerHandler {
    /// A handler that negotiates with `selector` and dials with [`TcpDialer`].
    pub fn new(selector: impl Selector + 'static) -> Self {
        Self {
            selector: Some(Arc::new(selector)),
            ..Self::default()
        }
    }

    /// Replaces the dialer used for `CONNECT`.
    pub fn with_dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.dialer = Arc::new(dialer);
        self
    }

    /// Wraps an accepted TCP stream and serves it.
    pub async fn handle_tcp(&self, stream: TcpStream) -> Result<(), SocksError> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        let conn = Connection::server(stream, self.selector.clone()).with_addrs(local, peer);
        self.handle(conn).await
    }

    /// Serves any stream. Without transport addresses the BIND reply carries
    /// the listener's own address.
    pub async fn handle_stream<S>(&self, stream: S) -> Result<(), SocksError>
    where
        S: AsyncStream + 'static,
    {
        self.handle(Connection::server(stream, self.selector.clone()))
            .await
    }

    /// Serves a connection whose handshake may or may not have run yet.
    ///
    /// Streams opened along the way are closed when this returns.
    pub async fn handle(&self, mut conn: Connection) -> Result<(), SocksError> {
        conn.handshake().await?;

        let request = match Request::read_from(&mut conn).await {
            Ok(request) => request,
            Err(err) => {
                let rep = match err {
                    SocksError::CommandUnsupported(_) => Some(Rep::CommandNotSupported),
                    SocksError::AddressTypeUnsupported(_) => Some(Rep::AddressTypeNotSupported),
                    _ => None,
                };
                if let Some(rep) = rep {
                    let _ = Reply::status(rep).write_to(&mut conn).await;
                }
                warn!(peer = ?conn.peer_addr(), error = %err, "bad request");
                return Err(err);
            }
        };
        info!(peer = ?conn.peer_addr(), cmd = %request.cmd, dst = %request.dst, "SOCKS5 request");

        match request.cmd {
            CMD::Connect => self.connect(conn, request.dst).await,
            CMD::Bind => bind(conn, request.dst).await,
            CMD::UdpAssociate => {
                let _ = Reply::status(Rep::CommandNotSupported)
                    .write_to(&mut conn)
                    .await;
                warn!(peer = ?conn.peer_addr(), cmd = %request.cmd, "command not supported");
                Err(SocksError::CommandUnsupported(request.cmd as u8))
            }
        }
    }

    async fn connect(&self, mut conn: Connection, dst: AddrPort) -> Result<(), SocksError> {
        let target = match self.dialer.dial(&dst).await {
            Ok(target) => target,
            Err(err) => {
                warn!(%dst, error = %err, "dial failed");
                let _ = Reply::status(Rep::HostUnreachable)
                    .write_to(&mut conn)
                    .await;
                return Err(SocksError::unreachable(dst, err));
            }
        };
        debug!(%dst, "connected to target");

        Reply::status(Rep::Succeeded).write_to(&mut conn).await?;
        let result = relay(conn, target).await;
        info!(%dst, ok = result.is_ok(), "CONNECT finished");
        result
    }
}

async fn bind(mut conn: Connection, addr: AddrPort) -> Result<(), SocksError> {
    let listener = match listen_strict(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(%addr, error = %err, "bind failed");
            let _ = Reply::status(Rep::GeneralFailure)
                .write_to(&mut conn)
                .await;
            return Err(SocksError::unreachable(addr, err));
        }
    };

    let mut bound = AddrPort::from(listener.local_addr()?);
    if let Some(local) = conn.local_addr() {
        bound = bound.with_ip(local.ip());
    }
    Reply::new(Rep::Succeeded, bound.clone())
        .write_to(&mut conn)
        .await?;
    info!(%bound, "BIND listening");

    let mut pending = Vec::new();
    let accepted = tokio::select! {
        accepted = listener.accept() => accepted,
        closed = watch_client(&mut conn, &mut pending) => {
            debug!(%bound, "client left before an inbound connection arrived");
            return closed;
        }
    };
    drop(listener);

    let (mut inbound, remote) = accepted?;
    info!(%bound, %remote, "BIND accepted inbound connection");
    Reply::new(Rep::Succeeded, AddrPort::from(remote))
        .write_to(&mut conn)
        .await?;
    if !pending.is_empty() {
        inbound.write_all(&pending).await?;
    }

    let result = relay(conn, inbound).await;
    info!(%remote, ok = result.is_ok(), "BIND finished");
    result
}

/// Binds a listener that fails rather than share a port already in use.
async fn listen_strict(addr: &AddrPort) -> io::Result<TcpListener> {
    let addr: SocketAddr = addr.resolve().await?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(false)?;
    socket.bind(addr)?;
    socket.listen(BIND_BACKLOG)
}

/// Resolves once the client closes or fails.
///
/// Anything the client sends in the meantime is kept in `pending`. A client
/// that sends more than [`MAX_PENDING`] bytes ends the command with an error.
async fn watch_client(conn: &mut Connection, pending: &mut Vec<u8>) -> Result<(), SocksError> {
    let mut buf = relay_pool().acquire();
    loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if pending.len() + n > MAX_PENDING {
            return Err(io::Error::other(format!(
                "client sent more than {MAX_PENDING} bytes before the BIND peer connected"
            ))
            .into());
        }
        pending.extend_from_slice(&buf[..n]);
    }
}
