//! The responding side: method policy, command execution and a TCP front end.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::error::SocksError;

pub mod handler;
pub mod selector;

pub use handler::{Dialer, ServerHandler, TcpDialer};
pub use selector::{ServerSelector, check_credentials};

/// First delay after a failed accept.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
/// Longest delay between accept retries.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// A SOCKS5 server listening on TCP.
///
/// Each accepted connection is served on its own task by a [`ServerHandler`].
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind a new SOCKS5 server to an address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address to bind to, e.g., `"127.0.0.1:1080"`.
    ///
    /// # Errors
    ///
    /// Returns a `SocksError::Io` if binding fails.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, SocksError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Serve on an already bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    /// Returns the local address of the server.
    pub fn local_addr(&self) -> Result<SocketAddr, SocksError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever. Stop it by aborting or dropping its task,
    /// or use [`Server::serve_until`].
    pub async fn serve(self, handler: ServerHandler) -> Result<(), SocksError> {
        self.serve_until(handler, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves, then closes the listener.
    ///
    /// Connections already accepted keep running on their own tasks. Failed
    /// accepts are retried after a delay that starts at 5 ms and doubles up to
    /// 1 s; a successful accept resets it.
    pub async fn serve_until<F>(
        self,
        handler: ServerHandler,
        shutdown: F,
    ) -> Result<(), SocksError>
    where
        F: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        let addr = self.local_addr()?;
        info!("SOCKS5 proxy listening on {addr}");
        tokio::pin!(shutdown);

        let mut delay = Duration::ZERO;
        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => {
                    info!(%addr, "SOCKS5 proxy shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    delay = next_backoff(delay);
                    warn!(error = %e, retry_in = ?delay, "accept failed");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            delay = Duration::ZERO;

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                debug!(%peer, "client connected");
                match handler.handle_tcp(stream).await {
                    Ok(()) => debug!(%peer, "client finished"),
                    Err(e) => warn!(%peer, error = %e, "client error"),
                }
            });
        }
    }
}

fn next_backoff(delay: Duration) -> Duration {
    if delay.is_zero() {
        ACCEPT_BACKOFF_MIN
    } else {
        (delay * 2).min(ACCEPT_BACKOFF_MAX)
    }
}
