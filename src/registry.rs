//! Periodic jobs listing
//!
//! Failures never stop the loop: they are reported as error status events and
//! the next tick tries again. Only cancellation ends a run.

use crate::client::{ApiClient, ClientError, JobSummary};
use crate::events::{EventSender, JobEvent, Level};
use crate::session::{AuthError, Authenticator};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Jobs listing cancelled")]
    Cancelled,
}

pub struct JobRegistry {
    api: ApiClient,
    auth: Arc<Authenticator>,
    interval: Duration,
}

impl JobRegistry {
    pub fn new(api: ApiClient, auth: Arc<Authenticator>, interval: Duration) -> Self {
        Self { api, auth, interval }
    }

    /// Fetch the jobs listing once
    pub async fn list_once(&self, cancel: &CancellationToken) -> Result<Vec<JobSummary>, RegistryError> {
        let fetch = async {
            let token = self.auth.bearer().await?;
            let jobs = self.api.list_jobs(&token).await;
            if matches!(jobs, Err(ClientError::Unauthorized)) {
                self.auth.invalidate();
            }
            Ok::<_, RegistryError>(jobs?)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RegistryError::Cancelled),
            jobs = fetch => jobs,
        }
    }

    /// List jobs every interval until cancelled, then emit `job-finished`
    pub async fn run(&self, events: &EventSender, cancel: &CancellationToken) {
        info!(interval = ?self.interval, "Starting jobs registry");

        loop {
            match self.list_once(cancel).await {
                Ok(jobs) => {
                    debug!(count = jobs.len(), "Jobs listing refreshed");
                    events.emit(JobEvent::JobsUpdated { jobs });
                }
                Err(RegistryError::Cancelled) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch jobs");
                    events.status(format!("Failed to fetch jobs: {e}"), Level::Error);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Jobs registry stopped");
        events.emit(JobEvent::JobFinished);
    }
}
