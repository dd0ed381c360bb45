//! Cancellable single-file transfers with progress reporting.
//!
//! One [`TransferEngine`] call moves exactly one file in one direction. The
//! engine emits status and progress events while it works and returns the
//! outcome; the terminal event (`transfer-completed`, `transfer-failed` or a
//! poller's `job-error`) is emitted by whoever owns the transfer, so nothing
//! is reported twice. Partial artifacts are removed before an error returns.

mod download;
mod error;
mod upload;

pub use download::{filename_from_disposition, DownloadedArtifact};
pub use error::TransferError;
pub use upload::{UploadRequest, UploadedArtifact};

use crate::client::ApiClient;
use crate::config::{Config, ProcessingConfig};
use crate::events::{EventSender, JobEvent, Level};
use crate::humanize::ByteSize;
use crate::observability::Metrics;
use crate::session::Authenticator;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

/// Bookkeeping for one transfer, owned by the engine call that created it
#[derive(Debug, Clone)]
pub struct TransferDescriptor {
    pub id: Uuid,
    pub local_path: PathBuf,
    pub remote_url: String,
    pub direction: Direction,
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
    pub state: TransferState,
}

impl TransferDescriptor {
    pub fn new(direction: Direction, remote_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            local_path: PathBuf::new(),
            remote_url: remote_url.into(),
            direction,
            total_bytes: None,
            transferred_bytes: 0,
            state: TransferState::Pending,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.transferred_bytes += bytes;
    }

    /// Percentage progress clamped to the 20-95 band, `None` when the total is unknown
    pub fn banded_percent(&self) -> Option<u8> {
        let total = self.total_bytes.filter(|t| *t > 0)?;
        let raw = self.transferred_bytes.saturating_mul(100) / total;
        Some(raw.clamp(20, 95) as u8)
    }

    fn settle<T>(&mut self, result: &Result<T>) {
        self.state = match result {
            Ok(_) => TransferState::Completed,
            Err(TransferError::Cancelled) => TransferState::Cancelled,
            Err(_) => TransferState::Failed,
        };
    }
}

/// Engine settings derived from `[processing]`
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub temp_dir_prefix: String,
    pub temp_root: PathBuf,
    pub max_upload_bytes: ByteSize,
    pub upload_timeout: Duration,
}

impl From<&ProcessingConfig> for TransferSettings {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            temp_dir_prefix: config.temp_dir_prefix.clone(),
            temp_root: config.temp_root(),
            max_upload_bytes: config.max_upload_bytes,
            upload_timeout: config.upload_timeout(),
        }
    }
}

impl From<&Config> for TransferSettings {
    fn from(config: &Config) -> Self {
        (&config.processing).into()
    }
}

pub struct TransferEngine {
    settings: TransferSettings,
    api: ApiClient,
    auth: Arc<Authenticator>,
    metrics: Arc<Metrics>,
}

impl TransferEngine {
    pub fn new(
        settings: TransferSettings,
        api: ApiClient,
        auth: Arc<Authenticator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            settings,
            api,
            auth,
            metrics,
        }
    }

    /// Standalone download: fetch the job's details for its data type, then
    /// the artifact. Emits exactly one `transfer-completed` or `transfer-failed`.
    pub async fn run_download(
        &self,
        job_id: &str,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<DownloadedArtifact> {
        let result = self.download_job(job_id, events, cancel).await;
        match &result {
            Ok(artifact) => events.emit(JobEvent::TransferCompleted {
                path: artifact.path.clone(),
                datatype_id: artifact.datatype_id.clone(),
            }),
            Err(e) => events.emit(JobEvent::TransferFailed {
                message: failure_message("Download", e),
            }),
        }
        result
    }

    /// Upload with exactly one terminal event, like [`Self::run_download`]
    pub async fn run_upload(
        &self,
        request: &UploadRequest,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<UploadedArtifact> {
        let result = self.upload(request, events, cancel).await;
        match &result {
            Ok(artifact) => events.emit(JobEvent::TransferCompleted {
                path: artifact.path.clone(),
                datatype_id: Some(artifact.datatype_id.clone()),
            }),
            Err(e) => events.emit(JobEvent::TransferFailed {
                message: failure_message("Inference", e),
            }),
        }
        result
    }

    fn finish<T>(&self, descriptor: &mut TransferDescriptor, result: &Result<T>, events: &EventSender) {
        descriptor.settle(result);
        match result {
            Ok(_) => {
                self.metrics.transfer_completed();
                info!(
                    transfer_id = %descriptor.id,
                    direction = ?descriptor.direction,
                    bytes = descriptor.transferred_bytes,
                    path = %descriptor.local_path.display(),
                    "Transfer completed"
                );
            }
            Err(TransferError::Cancelled) => {
                self.metrics.transfer_cancelled();
                info!(transfer_id = %descriptor.id, direction = ?descriptor.direction, "Transfer cancelled");
                events.status("Transfer cancelled", Level::Warning);
            }
            Err(e) => {
                self.metrics.transfer_failed();
                warn!(transfer_id = %descriptor.id, direction = ?descriptor.direction, error = %e, "Transfer failed");
                events.status(e.to_string(), Level::Error);
            }
        }
    }
}

fn failure_message(what: &str, e: &TransferError) -> String {
    if e.is_cancelled() {
        format!("{what} cancelled")
    } else {
        format!("{what} failed: {e}")
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        Ok(())
    }
}

/// Race a future against cancellation
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        output = fut => Ok(output),
    }
}
