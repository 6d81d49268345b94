//! Server-side method policy and username/password validation.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::auth::reply::{AuthReply, AuthStatus};
use crate::auth::request::AuthRequest;
use crate::error::SocksError;
use crate::msg::method::Method;
use crate::selector::{BoxStream, Credentials, Selector};

/// The responding side's [`Selector`].
///
/// With no users configured every client is let in: `NO AUTH` is chosen when
/// offered, and a `USERNAME/PASSWORD` exchange accepts any credentials. With
/// users configured, clients must authenticate with `USERNAME/PASSWORD`.
#[derive(Debug, Clone, Default)]
pub struct ServerSelector {
    users: Vec<Credentials>,
}

impl ServerSelector {
    /// A selector over `users`; an empty set leaves the server open.
    pub fn new(users: Vec<Credentials>) -> Self {
        Self { users }
    }

    /// Adds users to the credential set.
    pub fn with_users(mut self, users: impl IntoIterator<Item = Credentials>) -> Self {
        self.users.extend(users);
        self
    }

    /// The configured credential set.
    pub fn users(&self) -> &[Credentials] {
        &self.users
    }
}

/// Checks `username`/`password` against a credential set.
///
/// An empty set accepts everything. Otherwise an entry matches when:
///
/// - both username and password are equal, or
/// - the username is equal and the entry has no password, or
/// - the entry has no username and the password is equal.
pub fn check_credentials(users: &[Credentials], username: &str, password: &str) -> bool {
    if users.is_empty() {
        return true;
    }
    users.iter().any(|user| {
        let same_name = user.username == username;
        (same_name && user.password() == password)
            || (same_name && user.password().is_empty())
            || (user.username.is_empty() && user.password() == password)
    })
}

#[async_trait]
impl Selector for ServerSelector {
    fn methods(&self) -> Vec<Method> {
        if self.users.is_empty() {
            vec![Method::NO_AUTH]
        } else {
            vec![Method::USER_PASS]
        }
    }

    fn select(&self, offered: &[Method]) -> Method {
        let offers = |m: Method| offered.contains(&m);
        if !self.users.is_empty() {
            return if offers(Method::USER_PASS) {
                Method::USER_PASS
            } else {
                Method::NO_ACCEPTABLE
            };
        }
        if offered.is_empty() || offers(Method::NO_AUTH) {
            Method::NO_AUTH
        } else if offers(Method::USER_PASS) {
            Method::USER_PASS
        } else {
            Method::NO_ACCEPTABLE
        }
    }

    async fn on_selected(
        &self,
        method: Method,
        mut stream: BoxStream,
    ) -> Result<BoxStream, SocksError> {
        match method {
            Method::USER_PASS => {
                let request = match AuthRequest::read_from(&mut stream).await {
                    Ok(request) => request,
                    Err(SocksError::InvalidCredentials(reason)) => {
                        warn!(%reason, "malformed credentials");
                        let _ = stream
                            .write_all(&AuthReply::new(AuthStatus::Failure).to_bytes())
                            .await;
                        return Err(SocksError::AuthFailure(reason));
                    }
                    Err(err) => return Err(err),
                };
                let accepted = check_credentials(&self.users, &request.uname, &request.passwd);
                let status = if accepted {
                    AuthStatus::Success
                } else {
                    AuthStatus::Failure
                };
                stream.write_all(&AuthReply::new(status).to_bytes()).await?;
                stream.flush().await?;

                if !accepted {
                    warn!(user = %request.uname, "invalid credentials");
                    return Err(SocksError::AuthFailure(format!(
                        "invalid credentials for user {:?}",
                        request.uname
                    )));
                }
                debug!(user = %request.uname, "user authenticated");
                Ok(stream)
            }
            Method::NO_ACCEPTABLE => Err(SocksError::BadMethod),
            _ => Ok(stream),
        }
    }
}
