//! Bearer token lifetime tracking.
//!
//! The server does not tell us when a token expires, so expiry is estimated
//! from the time the token was issued and a configured lifetime. Tokens are
//! treated as expired `buffer` before the estimate so a request started just
//! before expiry does not fail mid-flight.
//!
//! Remote validation is fail-open: anything other than an explicit 401 is
//! taken as "still valid". A dead token is then caught by the next real request.

use crate::client::ApiClient;
use crate::config::TokenConfig;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A bearer token and the moment it was issued
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Why a token was declared unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// Local age estimate crossed `lifetime - buffer`, or no token is set
    Local,
    /// Server answered 401
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEvent {
    Expired(ExpiryReason),
}

/// Lifetime policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub lifetime: Duration,
    pub buffer: Duration,
    pub validation_timeout: Duration,
}

impl From<&TokenConfig> for TokenPolicy {
    fn from(config: &TokenConfig) -> Self {
        Self {
            lifetime: config.lifetime(),
            buffer: config.buffer(),
            validation_timeout: config.validation_timeout(),
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        (&TokenConfig::default()).into()
    }
}

/// Tracks one session's credential. Readers always see a whole credential;
/// writes swap the record under the lock.
pub struct TokenLifecycle {
    policy: TokenPolicy,
    api: ApiClient,
    credential: RwLock<Option<Credential>>,
    events: broadcast::Sender<TokenEvent>,
}

impl TokenLifecycle {
    pub fn new(api: ApiClient, policy: TokenPolicy) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            policy,
            api,
            credential: RwLock::new(None),
            events,
        }
    }

    /// Expiry notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.events.subscribe()
    }

    /// Replace the credential, issued now
    pub fn set(&self, token: impl Into<String>) {
        self.set_issued_at(token, Utc::now());
    }

    /// Replace the credential with an explicit issue time
    pub fn set_issued_at(&self, token: impl Into<String>, issued_at: DateTime<Utc>) {
        let credential = Credential {
            token: token.into(),
            issued_at,
        };
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = Some(credential);
        debug!(%issued_at, "Token set");
    }

    pub fn clear(&self) {
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = None;
        debug!("Token cleared");
    }

    /// Snapshot of the current credential
    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.credential().map(|c| c.token)
    }

    /// True when no token is set or `now - issued_at >= lifetime - buffer`
    pub fn is_expired_locally(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.credential() {
            Some(credential) => {
                let threshold = self.policy.lifetime.saturating_sub(self.policy.buffer);
                age(&credential, now) >= threshold
            }
            None => true,
        }
    }

    /// `max(0, lifetime - age)`; for display only
    pub fn time_until_expiry(&self) -> Duration {
        match self.credential() {
            Some(credential) => self
                .policy
                .lifetime
                .saturating_sub(age(&credential, Utc::now())),
            None => Duration::ZERO,
        }
    }

    /// Confirm the token against the server. Only an HTTP 401 makes this
    /// return false (or having no token at all); other statuses and network
    /// failures count as valid.
    pub async fn validate_remotely(&self, timeout: Duration) -> bool {
        let Some(token) = self.token() else {
            return false;
        };

        match self.api.probe(&token, timeout).await {
            Ok(StatusCode::UNAUTHORIZED) => {
                info!("Token rejected by server");
                false
            }
            Ok(StatusCode::OK) => true,
            Ok(status) => {
                debug!(status = status.as_u16(), "Unexpected validation status, assuming token valid");
                true
            }
            Err(e) => {
                warn!(error = %e, "Token validation request failed, assuming token valid");
                true
            }
        }
    }

    /// Local check first, then the server. Emits [`TokenEvent::Expired`] when
    /// either fails.
    pub async fn check_and_handle_expiration(&self) -> bool {
        if self.is_expired_locally() {
            self.notify(ExpiryReason::Local);
            return false;
        }

        if !self.validate_remotely(self.policy.validation_timeout).await {
            self.notify(ExpiryReason::Remote);
            return false;
        }

        true
    }

    fn notify(&self, reason: ExpiryReason) {
        info!(?reason, "Token expired");
        // No subscribers is fine
        let _ = self.events.send(TokenEvent::Expired(reason));
    }
}

fn age(credential: &Credential, now: DateTime<Utc>) -> Duration {
    // Issue times in the future count as age zero
    (now - credential.issued_at).to_std().unwrap_or(Duration::ZERO)
}
