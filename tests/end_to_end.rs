use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use socks5_engine::client::{self, ClientSelector, DialOptions};
use socks5_engine::server::{Server, ServerHandler, ServerSelector};
use socks5_engine::{AddrPort, Credentials, Method, SocksError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_proxy(users: Vec<Credentials>) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve(ServerHandler::new(ServerSelector::new(users))));
    addr
}

async fn start_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut sock, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let (mut r, mut w) = sock.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

fn login(user: &str, pass: &str) -> DialOptions {
    DialOptions::default()
        .with_selector(ClientSelector::with_credentials(Credentials::new(
            user,
            Some(pass),
        )))
        .with_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn connect_through_an_authenticating_proxy() {
    let proxy = start_proxy(vec!["admin:admin".parse().unwrap()]).await;
    let echo = start_echo().await;

    let mut conn = client::dial(proxy, login("admin", "admin")).await.unwrap();
    assert_eq!(conn.method(), Some(Method::USER_PASS));

    let reply = client::connect(&mut conn, echo.into()).await.unwrap();
    assert_eq!(reply.bnd, AddrPort::zero());

    conn.write_all(b"through the proxy").await.unwrap();
    let mut echoed = [0u8; 17];
    conn.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"through the proxy");
}

#[tokio::test]
async fn wrong_password_is_refused() {
    let proxy = start_proxy(vec!["admin:admin".parse().unwrap()]).await;

    let err = client::dial(proxy, login("admin", "nope")).await.unwrap_err();
    assert!(matches!(err, SocksError::AuthFailure(_)));
}

#[tokio::test]
async fn open_proxy_needs_no_credentials() {
    let proxy = start_proxy(Vec::new()).await;
    let echo = start_echo().await;

    let mut conn = client::dial(proxy, DialOptions::default()).await.unwrap();
    assert_eq!(conn.method(), Some(Method::NO_AUTH));
    client::connect(&mut conn, echo.into()).await.unwrap();

    conn.write_all(b"x").await.unwrap();
    let mut byte = [0u8; 1];
    conn.read_exact(&mut byte).await.unwrap();
    assert_eq!(&byte, b"x");
}

#[tokio::test]
async fn bind_through_the_proxy() {
    let proxy = start_proxy(Vec::new()).await;
    let mut conn = client::dial(proxy, DialOptions::default()).await.unwrap();

    let first = client::bind(&mut conn, AddrPort::V4(Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    assert_eq!(first.bnd.host(), "127.0.0.1");
    let listening = SocketAddr::from((Ipv4Addr::LOCALHOST, first.bnd.port()));

    let mut inbound = TcpStream::connect(listening).await.unwrap();
    let second = client::read_reply(&mut conn).await.unwrap();
    assert_eq!(second.bnd, AddrPort::from(inbound.local_addr().unwrap()));

    inbound.write_all(b"reverse").await.unwrap();
    let mut got = [0u8; 7];
    conn.read_exact(&mut got).await.unwrap();
    assert_eq!(&got, b"reverse");

    conn.write_all(b"back").await.unwrap();
    let mut back = [0u8; 4];
    inbound.read_exact(&mut back).await.unwrap();
    assert_eq!(&back, b"back");
}

#[tokio::test]
async fn unreachable_target_is_rejected() {
    let proxy = start_proxy(Vec::new()).await;
    let closed = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let mut conn = client::dial(proxy, DialOptions::default()).await.unwrap();
    let err = client::connect(&mut conn, closed.into()).await.unwrap_err();
    assert!(matches!(
        err,
        SocksError::Rejected(socks5_engine::Rep::HostUnreachable)
    ));
}
