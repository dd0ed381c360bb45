//! Job poller: authenticate, poll a job until the server finishes it, then
//! download the artifact.
//!
//! One [`JobPoller`] drives one job through
//! `authenticating -> polling -> downloading -> done`, or to `failed` from any
//! step. Every run ends with exactly one `transfer-completed` or `job-error`
//! event followed by exactly one `job-finished`.

mod state;

pub use state::{JobHandle, JobStatus, PollError, PollerState};

use crate::client::{ApiClient, ClientError, JobDetail};
use crate::config::{Config, PollingConfig};
use crate::events::{EventSender, JobEvent};
use crate::observability::Metrics;
use crate::session::{AuthError, Authenticator};
use crate::transfer::TransferEngine;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type Result<T> = std::result::Result<T, PollError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerSettings {
    pub interval: Duration,
    pub error_sleep: Duration,
}

impl From<&PollingConfig> for PollerSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            error_sleep: config.error_sleep(),
        }
    }
}

impl From<&Config> for PollerSettings {
    fn from(config: &Config) -> Self {
        (&config.polling).into()
    }
}

/// Result of a job that reached `done`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub path: PathBuf,
    pub datatype_id: Option<String>,
}

pub struct JobPoller {
    job_id: String,
    api: ApiClient,
    auth: Arc<Authenticator>,
    engine: Arc<TransferEngine>,
    settings: PollerSettings,
    metrics: Arc<Metrics>,
    state: PollerState,
    handle: Option<JobHandle>,
}

impl JobPoller {
    pub fn new(
        job_id: impl Into<String>,
        api: ApiClient,
        auth: Arc<Authenticator>,
        engine: Arc<TransferEngine>,
        settings: PollerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            api,
            auth,
            engine,
            settings,
            metrics,
            state: PollerState::Authenticating,
            handle: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// The job as last reported by the server
    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    /// Drive the job to a terminal state, emitting the terminal events
    pub async fn run(&mut self, events: &EventSender, cancel: &CancellationToken) -> Result<JobOutcome> {
        info!(job_id = %self.job_id, "Starting job poller");

        let result = self.drive(events, cancel).await;
        match &result {
            Ok(outcome) => {
                self.metrics.job_completed();
                info!(job_id = %self.job_id, path = %outcome.path.display(), "Job done");
                events.emit(JobEvent::TransferCompleted {
                    path: outcome.path.clone(),
                    datatype_id: outcome.datatype_id.clone(),
                });
            }
            Err(e) => {
                self.transition(PollerState::Failed);
                if e.is_cancelled() {
                    info!(job_id = %self.job_id, "Job poller cancelled");
                } else {
                    self.metrics.job_failed();
                    error!(job_id = %self.job_id, error = %e, "Job failed");
                }
                events.emit(JobEvent::JobError { message: e.to_string() });
            }
        }

        events.emit(JobEvent::JobFinished);
        result
    }

    async fn drive(&mut self, events: &EventSender, cancel: &CancellationToken) -> Result<JobOutcome> {
        self.authenticate(cancel).await?;
        self.transition(PollerState::Polling);

        self.poll_until_ready(events, cancel).await?;
        self.transition(PollerState::Downloading);

        ensure_active(cancel)?;
        let artifact = self.engine.download(&self.job_id, events, cancel).await?;
        self.transition(PollerState::Done);

        Ok(JobOutcome {
            path: artifact.path,
            datatype_id: self.handle.as_ref().and_then(|h| h.datatype_id.clone()),
        })
    }

    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        match cancellable(cancel, self.auth.authenticate()).await? {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Authentication failed");
                Err(match e {
                    AuthError::TokenExpired => PollError::TokenExpired,
                    other => PollError::AuthFailure(other.to_string()),
                })
            }
        }
    }

    /// Poll until the job ends with a resource
    async fn poll_until_ready(&mut self, events: &EventSender, cancel: &CancellationToken) -> Result<()> {
        let mut retried_unauthorized = false;

        loop {
            ensure_active(cancel)?;
            self.metrics.poll();

            let detail = match self.fetch_detail(cancel).await? {
                Ok(detail) => {
                    retried_unauthorized = false;
                    detail
                }
                Err(ClientError::Unauthorized) => {
                    self.auth.invalidate();
                    if !self.auth.can_login() {
                        return Err(PollError::TokenExpired);
                    }
                    if retried_unauthorized {
                        return Err(PollError::AuthFailure("server rejected the token".into()));
                    }
                    warn!(job_id = %self.job_id, "Token rejected while polling, logging in again");
                    retried_unauthorized = true;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let handle = JobHandle::from_detail(&self.job_id, &detail);
            debug!(
                job_id = %self.job_id,
                status = %handle.status,
                status_code = handle.status_code,
                resource = handle.resource_available,
                "Job status"
            );
            let next = self.classify(&handle, events);
            self.handle = Some(handle);

            match next? {
                Some(pause) => sleep(pause, cancel).await?,
                None => return Ok(()),
            }
        }
    }

    /// Decide what a poll response means: `None` to download, a pause to poll again
    fn classify(&self, handle: &JobHandle, events: &EventSender) -> Result<Option<Duration>> {
        match &handle.status {
            status if status.is_active() => {
                events.info(format!(
                    "Job {} status: {} - {}",
                    self.job_id, status, handle.result_message
                ));
                Ok(Some(self.settings.interval))
            }
            JobStatus::End if handle.resource_available => Ok(None),
            JobStatus::End => Err(PollError::NoResource),
            JobStatus::Error if handle.is_soft_error() => {
                self.metrics.soft_error();
                warn!(job_id = %self.job_id, result = %handle.result_message, "Soft job error, retrying");
                events.warning(format!("Job Warning: {}", handle.result_message));
                Ok(Some(self.settings.error_sleep))
            }
            JobStatus::Error => Err(PollError::FatalServerError {
                status_code: handle.status_code,
                message: handle.result_message.clone(),
            }),
            other => Err(PollError::UnknownStatus(other.to_string())),
        }
    }

    /// One status request. Authentication problems end the run; client errors
    /// are returned to the caller for classification.
    async fn fetch_detail(
        &self,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<JobDetail, ClientError>> {
        let token = cancellable(cancel, self.auth.bearer()).await??;
        cancellable(cancel, self.api.job_detail(&token, &self.job_id)).await
    }

    /// `done` and `failed` are final
    fn transition(&mut self, next: PollerState) {
        if self.state.is_terminal() {
            warn!(job_id = %self.job_id, state = ?self.state, to = ?next, "Ignoring transition out of a final state");
            return;
        }
        if self.state != next {
            info!(job_id = %self.job_id, from = ?self.state, to = ?next, "Poller state changed");
            self.state = next;
        }
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PollError::Cancelled)
    } else {
        Ok(())
    }
}

async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        output = fut => Ok(output),
    }
}

async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
