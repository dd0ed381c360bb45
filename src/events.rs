//! Events emitted by pollers, transfers and the job registry.
//!
//! Components never block on their consumer: events go through an unbounded
//! channel and are dropped silently once the receiver is gone.

use crate::client::JobSummary;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// Transfer progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Progress {
    /// 0..=100
    Percent(u8),
    /// Total size unknown
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    StatusUpdate { message: String, level: Level },
    Progress { progress: Progress },
    TransferCompleted { path: PathBuf, datatype_id: Option<String> },
    TransferFailed { message: String },
    JobError { message: String },
    JobsUpdated { jobs: Vec<JobSummary> },
    JobFinished,
}

impl JobEvent {
    /// Events that close a job or transfer lifecycle. `job-finished` follows
    /// them as a separate completion signal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::TransferCompleted { .. }
                | JobEvent::TransferFailed { .. }
                | JobEvent::JobError { .. }
        )
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<JobEvent>;

/// Cloneable handle for emitting [`JobEvent`]s
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }

    pub fn status(&self, message: impl Into<String>, level: Level) {
        self.emit(JobEvent::StatusUpdate {
            message: message.into(),
            level,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.status(message, Level::Info);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.status(message, Level::Warning);
    }

    pub fn progress(&self, progress: Progress) {
        self.emit(JobEvent::Progress { progress });
    }

    pub fn percent(&self, value: u8) {
        self.progress(Progress::Percent(value.min(100)));
    }
}
