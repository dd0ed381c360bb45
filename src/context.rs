//! Everything a job needs, built once from a [`Config`] and passed down explicitly

use crate::client::{ApiClient, ClientError};
use crate::config::Config;
use crate::observability::Metrics;
use crate::poller::{JobPoller, PollerSettings};
use crate::registry::JobRegistry;
use crate::session::{Authenticator, Credentials};
use crate::token::{TokenLifecycle, TokenPolicy};
use crate::transfer::{TransferEngine, TransferSettings};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub api: ApiClient,
    pub tokens: Arc<TokenLifecycle>,
    pub auth: Arc<Authenticator>,
    pub engine: Arc<TransferEngine>,
    pub metrics: Arc<Metrics>,
}

impl AppContext {
    /// Wire up one session. A pre-issued token from the environment is
    /// installed as if it had just been issued.
    pub fn from_config(config: Config) -> Result<Self, ClientError> {
        let api = ApiClient::from_config(&config)?;
        let metrics = Arc::new(Metrics::new());

        let tokens = Arc::new(TokenLifecycle::new(api.clone(), TokenPolicy::from(&config.token)));
        if let Some(token) = config.credentials.token.as_deref().filter(|t| !t.is_empty()) {
            debug!("Using pre-issued token");
            tokens.set(token);
        }

        let credentials = match (&config.credentials.username, &config.credentials.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        };

        let auth = Arc::new(Authenticator::new(
            api.clone(),
            tokens.clone(),
            credentials,
            config.token.validation_interval(),
            metrics.clone(),
        ));

        let engine = Arc::new(TransferEngine::new(
            TransferSettings::from(&config),
            api.clone(),
            auth.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            api,
            tokens,
            auth,
            engine,
            metrics,
        })
    }

    pub fn poller(&self, job_id: impl Into<String>) -> JobPoller {
        JobPoller::new(
            job_id,
            self.api.clone(),
            self.auth.clone(),
            self.engine.clone(),
            PollerSettings::from(self.config.as_ref()),
            self.metrics.clone(),
        )
    }

    pub fn registry(&self) -> JobRegistry {
        JobRegistry::new(
            self.api.clone(),
            self.auth.clone(),
            self.config.polling.registry_interval(),
        )
    }
}
