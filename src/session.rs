//! Authentication on top of [`TokenLifecycle`].
//!
//! [`Authenticator::bearer`] is called before every authenticated request. It
//! re-runs the login exchange whenever the token is missing or expired, so a
//! poll that runs for hours survives token expiry. Sessions without a
//! username/password (pre-issued token) surface expiry as [`AuthError::TokenExpired`].

use crate::client::{ApiClient, ClientError};
use crate::observability::Metrics;
use crate::token::TokenLifecycle;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Authentication token has expired. Please login again.")]
    TokenExpired,

    #[error("No credentials available to log in")]
    MissingCredentials,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Username/password pair for the login exchange
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

pub struct Authenticator {
    api: ApiClient,
    tokens: Arc<TokenLifecycle>,
    credentials: Option<Credentials>,
    /// Minimum gap between remote validations on the request path
    validation_interval: Duration,
    last_remote_check: Mutex<Option<Instant>>,
    /// Serializes login exchanges: the lifecycle has a single writer at a time
    login_lock: tokio::sync::Mutex<()>,
    metrics: Arc<Metrics>,
}

impl Authenticator {
    pub fn new(
        api: ApiClient,
        tokens: Arc<TokenLifecycle>,
        credentials: Option<Credentials>,
        validation_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            api,
            tokens,
            credentials,
            validation_interval,
            last_remote_check: Mutex::new(None),
            login_lock: tokio::sync::Mutex::new(()),
            metrics,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenLifecycle> {
        &self.tokens
    }

    pub fn can_login(&self) -> bool {
        self.credentials.is_some()
    }

    /// Token for the initial authentication step: logs in when the token is
    /// absent or locally expired, without a remote round-trip.
    pub async fn authenticate(&self) -> Result<String, AuthError> {
        let current = self.tokens.token();
        if let Some(token) = current.clone().filter(|_| !self.tokens.is_expired_locally()) {
            return Ok(token);
        }
        self.relogin(current).await
    }

    /// Token for an authenticated request. Performs the composite expiry
    /// check (remote part at most once per validation interval) and logs in
    /// again when it fails.
    pub async fn bearer(&self) -> Result<String, AuthError> {
        let usable = if self.tokens.is_expired_locally() {
            false
        } else if self.remote_check_due() {
            let usable = self.tokens.check_and_handle_expiration().await;
            self.mark_remote_check();
            usable
        } else {
            true
        };

        let current = self.tokens.token();
        match current {
            Some(token) if usable => Ok(token),
            stale => self.relogin(stale).await,
        }
    }

    /// Drop the current token, e.g. after the server answered 401
    pub fn invalidate(&self) {
        self.tokens.clear();
        *self.last_remote_check.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Log in unless another task already replaced `stale` while we waited
    async fn relogin(&self, stale: Option<String>) -> Result<String, AuthError> {
        let Some(credentials) = &self.credentials else {
            self.tokens.clear();
            return Err(match stale {
                Some(_) => AuthError::TokenExpired,
                None => AuthError::MissingCredentials,
            });
        };

        let _guard = self.login_lock.lock().await;

        if let Some(token) = self.tokens.token() {
            if Some(&token) != stale.as_ref() && !self.tokens.is_expired_locally() {
                debug!("Token refreshed by another task");
                return Ok(token);
            }
        }

        self.login(credentials).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<String, AuthError> {
        debug!(username = %credentials.username, "Performing login exchange");
        self.metrics.login_attempted();

        let response = match self.api.login(&credentials.username, &credentials.password).await {
            Ok(response) => response,
            Err(ClientError::Unauthorized) => {
                self.tokens.clear();
                warn!(username = %credentials.username, "Login rejected");
                return Err(AuthError::LoginRejected("invalid username or password".into()));
            }
            Err(ClientError::Status { status_code, message }) if (400..500).contains(&status_code) => {
                self.tokens.clear();
                warn!(username = %credentials.username, status_code, "Login rejected");
                return Err(AuthError::LoginRejected(message));
            }
            Err(e) => return Err(e.into()),
        };

        if response.access_token.trim().is_empty() {
            return Err(AuthError::LoginRejected("server returned an empty token".into()));
        }

        self.tokens.set(response.access_token.clone());
        self.mark_remote_check();
        info!(username = %credentials.username, "Logged in");
        Ok(response.access_token)
    }

    fn remote_check_due(&self) -> bool {
        match *self.last_remote_check.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(at) => at.elapsed() >= self.validation_interval,
            None => true,
        }
    }

    fn mark_remote_check(&self) {
        *self.last_remote_check.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}
