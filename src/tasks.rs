//! One tokio task per job or transfer.
//!
//! Each task gets a child of the caller's cancellation token: cancelling the
//! parent stops every task, cancelling a handle stops only that task.

use crate::events::EventSender;
use crate::poller::{self, JobOutcome, JobPoller};
use crate::registry::JobRegistry;
use crate::transfer::{self, DownloadedArtifact, TransferEngine, UploadRequest, UploadedArtifact};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task panicked or was aborted: {0}")]
    Join(#[from] JoinError),
}

pub struct TaskHandle<T> {
    cancel: CancellationToken,
    join: JoinHandle<T>,
}

impl<T: Send + 'static> TaskHandle<T> {
    fn spawn<F>(parent: &CancellationToken, task: impl FnOnce(CancellationToken) -> F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let cancel = parent.child_token();
        let join = tokio::spawn(task(cancel.clone()));
        Self { cancel, join }
    }

    /// Request cooperative cancellation. The task still emits its terminal events.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Result<T, TaskError> {
        Ok(self.join.await?)
    }
}

pub fn spawn_poller(
    mut poller: JobPoller,
    events: EventSender,
    parent: &CancellationToken,
) -> TaskHandle<poller::Result<JobOutcome>> {
    TaskHandle::spawn(parent, move |cancel| async move { poller.run(&events, &cancel).await })
}

pub fn spawn_download(
    engine: Arc<TransferEngine>,
    job_id: String,
    events: EventSender,
    parent: &CancellationToken,
) -> TaskHandle<transfer::Result<DownloadedArtifact>> {
    TaskHandle::spawn(parent, move |cancel| async move {
        engine.run_download(&job_id, &events, &cancel).await
    })
}

pub fn spawn_upload(
    engine: Arc<TransferEngine>,
    request: UploadRequest,
    events: EventSender,
    parent: &CancellationToken,
) -> TaskHandle<transfer::Result<UploadedArtifact>> {
    TaskHandle::spawn(parent, move |cancel| async move {
        engine.run_upload(&request, &events, &cancel).await
    })
}

pub fn spawn_registry(
    registry: Arc<JobRegistry>,
    events: EventSender,
    parent: &CancellationToken,
) -> TaskHandle<()> {
    TaskHandle::spawn(parent, move |cancel| async move { registry.run(&events, &cancel).await })
}
