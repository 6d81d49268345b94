//! Client-side method offer and username/password subnegotiation.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::auth::reply::{AuthReply, AuthStatus};
use crate::auth::request::AuthRequest;
use crate::error::SocksError;
use crate::msg::method::Method;
use crate::selector::{BoxStream, Credentials, Selector};

/// The initiating side's [`Selector`].
#[derive(Debug, Clone, Default)]
pub struct ClientSelector {
    methods: Vec<Method>,
    credentials: Option<Credentials>,
}

impl ClientSelector {
    /// Offers `methods` (`NO AUTH` when empty) and answers a
    /// `USERNAME/PASSWORD` selection with `credentials`.
    pub fn new(credentials: Option<Credentials>, methods: Vec<Method>) -> Self {
        Self {
            methods,
            credentials,
        }
    }

    /// Offers `NO AUTH` and `USERNAME/PASSWORD`, authenticating as `credentials`.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self::new(Some(credentials), vec![Method::NO_AUTH, Method::USER_PASS])
    }
}

#[async_trait]
impl Selector for ClientSelector {
    fn methods(&self) -> Vec<Method> {
        self.methods.clone()
    }

    fn select(&self, _offered: &[Method]) -> Method {
        Method::NO_AUTH
    }

    async fn on_selected(
        &self,
        method: Method,
        mut stream: BoxStream,
    ) -> Result<BoxStream, SocksError> {
        match method {
            Method::USER_PASS => {
                let (username, password) = match &self.credentials {
                    Some(creds) => (creds.username.as_str(), creds.password()),
                    None => ("", ""),
                };
                stream
                    .write_all(&AuthRequest::new(username, password).to_bytes()?)
                    .await?;
                stream.flush().await?;

                let reply = AuthReply::read_from(&mut stream).await?;
                if reply.status != AuthStatus::Success {
                    return Err(SocksError::AuthFailure(format!(
                        "server rejected user {username:?}"
                    )));
                }
                debug!(user = %username, "authenticated to proxy");
                Ok(stream)
            }
            Method::NO_ACCEPTABLE => Err(SocksError::BadMethod),
            _ => Ok(stream),
        }
    }
}
