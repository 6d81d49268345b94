//! The negotiated SOCKS5 connection.
//!
//! [`Connection`] wraps a raw stream and runs the two-phase handshake on it:
//! method negotiation, then the subnegotiation of the chosen method through
//! the configured [`Selector`]. The handshake runs at most once. Calls to
//! [`Connection::handshake`] serialize on an internal lock; after completion
//! every call returns the cached outcome without touching the wire. The
//! first read or write drives the handshake implicitly.
//!
//! ```text
//! Init ──▶ InFlight ──▶ Ready { stream, method }
//!               └──────▶ Failed(error)
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SocksError;
use crate::msg::message::{MethodList, MethodSelection};
use crate::msg::method::Method;
use crate::selector::{AsyncStream, BoxStream, Selector};

/// Which side of the handshake a [`Connection`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Offers methods and follows the peer's choice (client).
    Initiator,
    /// Reads the offer and chooses (server).
    Responder,
}

type HandshakeFuture = Pin<Box<dyn Future<Output = Result<(BoxStream, Method), SocksError>> + Send>>;

enum Stage {
    Init(BoxStream),
    InFlight(HandshakeFuture),
    Ready { stream: BoxStream, method: Method },
    Failed(SocksError),
    Closed,
}

impl Stage {
    fn begin(&mut self, role: Role, selector: Option<Arc<dyn Selector>>) {
        if let Stage::Init(stream) = std::mem::replace(self, Stage::Closed) {
            *self = Stage::InFlight(Box::pin(run_handshake(role, selector, stream)));
        }
    }

    fn settle(&mut self, outcome: Result<(BoxStream, Method), SocksError>) {
        *self = match outcome {
            Ok((stream, method)) => Stage::Ready { stream, method },
            Err(err) => Stage::Failed(err),
        };
    }

    fn name(&self) -> &'static str {
        match self {
            Stage::Init(_) => "init",
            Stage::InFlight(_) => "in-flight",
            Stage::Ready { .. } => "ready",
            Stage::Failed(_) => "failed",
            Stage::Closed => "closed",
        }
    }
}

/// A stream that speaks SOCKS5 once its handshake has completed.
pub struct Connection {
    role: Role,
    selector: Option<Arc<dyn Selector>>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    stage: Mutex<Stage>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = self.stage.try_lock().map_or("busy", |stage| stage.name());
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("stage", &stage)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wraps `stream` for `role`. No bytes move until the handshake is driven.
    pub fn new<S>(role: Role, stream: S, selector: Option<Arc<dyn Selector>>) -> Self
    where
        S: AsyncStream + 'static,
    {
        Self {
            role,
            selector,
            local_addr: None,
            peer_addr: None,
            stage: Mutex::new(Stage::Init(Box::new(stream))),
        }
    }

    /// Wraps `stream` for the initiating (client) role.
    pub fn client<S>(stream: S, selector: Option<Arc<dyn Selector>>) -> Self
    where
        S: AsyncStream + 'static,
    {
        Self::new(Role::Initiator, stream, selector)
    }

    /// Wraps `stream` for the responding (server) role.
    pub fn server<S>(stream: S, selector: Option<Arc<dyn Selector>>) -> Self
    where
        S: AsyncStream + 'static,
    {
        Self::new(Role::Responder, stream, selector)
    }

    /// Records the endpoints of the underlying transport.
    pub fn with_addrs(mut self, local: SocketAddr, peer: SocketAddr) -> Self {
        self.local_addr = Some(local);
        self.peer_addr = Some(peer);
        self
    }

    /// The side of the handshake this connection plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The local transport address, when recorded with [`Connection::with_addrs`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The remote transport address, when recorded with [`Connection::with_addrs`].
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// The negotiated method, if the handshake has succeeded.
    pub fn method(&self) -> Option<Method> {
        match &*self.stage.try_lock().ok()? {
            Stage::Ready { method, .. } => Some(*method),
            _ => None,
        }
    }

    /// Runs the handshake, or returns the outcome of the one already run.
    ///
    /// A cancelled call leaves the in-flight exchange in place; the next call
    /// resumes it rather than starting over.
    pub async fn handshake(&self) -> Result<Method, SocksError> {
        let mut stage = self.stage.lock().await;
        if matches!(*stage, Stage::Init(_)) {
            stage.begin(self.role, self.selector.clone());
        }
        if let Stage::InFlight(fut) = &mut *stage {
            let outcome = fut.as_mut().await;
            stage.settle(outcome);
        }

        match &*stage {
            Stage::Ready { method, .. } => Ok(*method),
            Stage::Failed(err) => Err(err.clone()),
            _ => Err(io::Error::from(io::ErrorKind::NotConnected).into()),
        }
    }

    fn poll_stream(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<&mut BoxStream>> {
        let role = self.role;
        let selector = self.selector.clone();
        let stage = self.stage.get_mut();

        if matches!(stage, Stage::Init(_)) {
            stage.begin(role, selector);
        }
        if let Stage::InFlight(fut) = &mut *stage {
            let outcome = ready!(fut.as_mut().poll(cx));
            stage.settle(outcome);
        }

        match stage {
            Stage::Ready { stream, .. } => Poll::Ready(Ok(stream)),
            Stage::Failed(err) => Poll::Ready(Err(err.clone().into())),
            _ => Poll::Ready(Err(io::ErrorKind::NotConnected.into())),
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let stream = ready!(self.get_mut().poll_stream(cx))?;
        Pin::new(stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let stream = ready!(self.get_mut().poll_stream(cx))?;
        Pin::new(stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let stream = ready!(self.get_mut().poll_stream(cx))?;
        Pin::new(stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stage.get_mut() {
            Stage::Ready { stream, .. } => Pin::new(stream).poll_shutdown(cx),
            _ => Poll::Ready(Ok(())),
        }
    }
}

async fn run_handshake(
    role: Role,
    selector: Option<Arc<dyn Selector>>,
    mut stream: BoxStream,
) -> Result<(BoxStream, Method), SocksError> {
    let method = match role {
        Role::Initiator => {
            let mut methods = selector.as_ref().map(|s| s.methods()).unwrap_or_default();
            if methods.is_empty() {
                methods.push(Method::NO_AUTH);
            }
            stream.write_all(&MethodList::new(methods).to_bytes()).await?;
            stream.flush().await?;

            let selection = MethodSelection::read_from(&mut stream).await?;
            if selection.method == Method::NO_ACCEPTABLE {
                return Err(SocksError::BadMethod);
            }
            selection.method
        }
        Role::Responder => {
            let mut offered = MethodList::read_from(&mut stream).await?.methods;
            // An empty offer stands for NO AUTH.
            if offered.is_empty() {
                offered.push(Method::NO_AUTH);
            }
            let method = selector
                .as_ref()
                .map_or(Method::NO_AUTH, |s| s.select(&offered));
            stream
                .write_all(&MethodSelection::new(method).to_bytes())
                .await?;
            stream.flush().await?;
            method
        }
    };

    if let Some(selector) = selector {
        stream = selector.on_selected(method, stream).await?;
    }
    debug!(?role, %method, "SOCKS5 handshake completed");
    Ok((stream, method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, duplex};

    /// Picks a fixed method, remembers what it was offered and counts
    /// subnegotiations.
    struct Fixed {
        offer: Vec<Method>,
        choice: Method,
        offered: StdMutex<Vec<Method>>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(offer: Vec<Method>, choice: Method) -> Arc<Self> {
            Arc::new(Self {
                offer,
                choice,
                offered: StdMutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Selector for Fixed {
        fn methods(&self) -> Vec<Method> {
            self.offer.clone()
        }

        fn select(&self, offered: &[Method]) -> Method {
            *self.offered.lock().unwrap() = offered.to_vec();
            self.choice
        }

        async fn on_selected(
            &self,
            _method: Method,
            stream: BoxStream,
        ) -> Result<BoxStream, SocksError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(stream)
        }
    }

    async fn nothing_more(peer: &mut tokio::io::DuplexStream) -> bool {
        let mut byte = [0u8; 1];
        tokio::time::timeout(Duration::from_millis(50), peer.read(&mut byte))
            .await
            .is_err()
    }

    #[tokio::test]
    async fn client_defaults_to_offering_no_auth() {
        let (local, mut peer) = duplex(64);
        let conn = Connection::client(local, None);

        let server = tokio::spawn(async move {
            let mut offer = [0u8; 3];
            peer.read_exact(&mut offer).await.unwrap();
            peer.write_all(&[0x05, 0x00]).await.unwrap();
            (offer, peer)
        });

        assert_eq!(conn.handshake().await.unwrap(), Method::NO_AUTH);
        let (offer, _peer) = server.await.unwrap();
        assert_eq!(offer, [0x05, 0x01, 0x00]);
        assert_eq!(conn.method(), Some(Method::NO_AUTH));
    }

    #[tokio::test]
    async fn handshake_runs_once_and_caches_success() {
        let (local, mut peer) = duplex(64);
        let selector = Fixed::new(vec![Method::USER_PASS], Method::USER_PASS);
        let conn = Connection::client(local, Some(selector.clone() as Arc<dyn Selector>));

        peer.write_all(&[0x05, 0x02]).await.unwrap();
        assert_eq!(conn.handshake().await.unwrap(), Method::USER_PASS);
        assert_eq!(conn.handshake().await.unwrap(), Method::USER_PASS);
        assert_eq!(selector.calls.load(Ordering::SeqCst), 1);

        let mut offer = [0u8; 3];
        peer.read_exact(&mut offer).await.unwrap();
        assert_eq!(offer, [0x05, 0x01, 0x02]);
        assert!(nothing_more(&mut peer).await);
    }

    #[tokio::test]
    async fn handshake_caches_failure() {
        let (local, mut peer) = duplex(64);
        let conn = Connection::client(local, None);

        peer.write_all(&[0x04, 0x00]).await.unwrap();
        assert!(matches!(conn.handshake().await, Err(SocksError::BadVersion(4))));

        // A well-formed answer arriving later is never consulted.
        let _ = peer.write_all(&[0x05, 0x00]).await;
        assert!(matches!(conn.handshake().await, Err(SocksError::BadVersion(4))));
        assert_eq!(conn.method(), None);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let (local, mut peer) = duplex(64);
        let conn = Arc::new(Connection::server(local, None));

        let first = tokio::spawn({
            let conn = conn.clone();
            async move { conn.handshake().await }
        });
        let second = tokio::spawn({
            let conn = conn.clone();
            async move { conn.handshake().await }
        });

        peer.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        assert_eq!(first.await.unwrap().unwrap(), Method::NO_AUTH);
        assert_eq!(second.await.unwrap().unwrap(), Method::NO_AUTH);

        let mut selection = [0u8; 2];
        peer.read_exact(&mut selection).await.unwrap();
        assert_eq!(selection, [0x05, 0x00]);
        assert!(nothing_more(&mut peer).await);
    }

    #[tokio::test]
    async fn no_acceptable_is_an_error_for_the_initiator() {
        let (local, mut peer) = duplex(64);
        let conn = Connection::client(local, None);
        peer.write_all(&[0x05, 0xFF]).await.unwrap();
        assert!(matches!(conn.handshake().await, Err(SocksError::BadMethod)));
    }

    #[tokio::test]
    async fn responder_writes_the_selectors_choice() {
        let (local, mut peer) = duplex(64);
        let selector = Fixed::new(vec![], Method::Private(0x80));
        let conn = Connection::server(local, Some(selector.clone() as Arc<dyn Selector>));

        peer.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        assert_eq!(conn.handshake().await.unwrap(), Method::Private(0x80));

        let mut selection = [0u8; 2];
        peer.read_exact(&mut selection).await.unwrap();
        assert_eq!(selection, [0x05, 0x80]);
        assert_eq!(selector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn responder_without_selector_accepts_empty_offer() {
        let (local, mut peer) = duplex(64);
        let conn = Connection::server(local, None);
        peer.write_all(&[0x05, 0x00]).await.unwrap();
        assert_eq!(conn.handshake().await.unwrap(), Method::NO_AUTH);
    }

    #[tokio::test]
    async fn empty_offer_reaches_the_selector_as_no_auth() {
        let (local, mut peer) = duplex(64);
        let selector = Fixed::new(vec![], Method::NO_AUTH);
        let conn = Connection::server(local, Some(selector.clone() as Arc<dyn Selector>));

        peer.write_all(&[0x05, 0x00]).await.unwrap();
        assert_eq!(conn.handshake().await.unwrap(), Method::NO_AUTH);
        assert_eq!(*selector.offered.lock().unwrap(), vec![Method::NO_AUTH]);
    }

    #[tokio::test]
    async fn debug_shows_role_and_stage() {
        let (local, mut peer) = duplex(64);
        let conn = Connection::server(local, None);
        let before = format!("{conn:?}");
        assert!(before.contains("Responder"));
        assert!(before.contains("\"init\""));

        peer.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        conn.handshake().await.unwrap();
        assert!(format!("{conn:?}").contains("\"ready\""));
    }

    #[tokio::test]
    async fn first_write_drives_the_handshake() {
        let (local, mut peer) = duplex(64);
        let mut conn = Connection::client(local, None);

        peer.write_all(&[0x05, 0x00]).await.unwrap();
        conn.write_all(b"payload").await.unwrap();

        let mut seen = [0u8; 3 + 7];
        peer.read_exact(&mut seen).await.unwrap();
        assert_eq!(&seen[..3], &[0x05, 0x01, 0x00]);
        assert_eq!(&seen[3..], b"payload");
        assert_eq!(conn.handshake().await.unwrap(), Method::NO_AUTH);
    }

    #[tokio::test]
    async fn read_after_failed_handshake_reports_the_error() {
        let (local, mut peer) = duplex(64);
        let mut conn = Connection::server(local, None);

        peer.write_all(&[0x04, 0x01, 0x00]).await.unwrap();
        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert!(err.to_string().contains("unsupported version: 4"));
    }
}
