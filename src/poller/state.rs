use crate::client::{ClientError, JobDetail};
use crate::session::AuthError;
use crate::transfer::TransferError;
use std::fmt;
use thiserror::Error;

/// Job status as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Start,
    Update,
    End,
    Error,
    Unknown(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Start => "start",
            JobStatus::Update => "update",
            JobStatus::End => "end",
            JobStatus::Error => "error",
            JobStatus::Unknown(s) => s,
        }
    }

    /// Still running on the server
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Start | JobStatus::Update)
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "start" => JobStatus::Start,
            "update" => JobStatus::Update,
            "end" => JobStatus::End,
            "error" => JobStatus::Error,
            other => JobStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job, rebuilt from every successful poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub status: JobStatus,
    pub status_code: i64,
    pub result_message: String,
    pub resource_available: bool,
    pub datatype_id: Option<String>,
}

impl JobHandle {
    pub fn from_detail(id: impl Into<String>, detail: &JobDetail) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::from(detail.status.as_str()),
            status_code: detail.status_code(),
            result_message: detail.result_message(),
            resource_available: detail.has_resource(),
            datatype_id: detail.datatype_id(),
        }
    }

    /// `error` carrying 404: the pipeline has nothing to show yet
    pub fn is_soft_error(&self) -> bool {
        self.status == JobStatus::Error && self.status_code == 404
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Authenticating,
    Polling,
    Downloading,
    Done,
    Failed,
}

impl PollerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollerState::Done | PollerState::Failed)
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Authentication token has expired. Please login again.")]
    TokenExpired,

    #[error("Job Error: {status_code} - {message}")]
    FatalServerError { status_code: i64, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("{0}")]
    ArtifactTooLarge(String),

    #[error("Job polling cancelled")]
    Cancelled,

    #[error("Job completed but no resource URL provided")]
    NoResource,

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Download failed: {0}")]
    Transfer(TransferError),
}

impl PollError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PollError::Cancelled)
    }
}

impl From<ClientError> for PollError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Unauthorized => PollError::AuthFailure("server rejected the token".into()),
            ClientError::Status { status_code, message } => PollError::FatalServerError {
                status_code: i64::from(status_code),
                message,
            },
            other => PollError::NetworkError(other.to_string()),
        }
    }
}

impl From<AuthError> for PollError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::TokenExpired => PollError::TokenExpired,
            AuthError::Client(ClientError::Timeout | ClientError::Network(_)) => {
                PollError::NetworkError(e.to_string())
            }
            other => PollError::AuthFailure(other.to_string()),
        }
    }
}

impl From<TransferError> for PollError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Cancelled => PollError::Cancelled,
            TransferError::TooLarge { .. } => PollError::ArtifactTooLarge(e.to_string()),
            other => PollError::Transfer(other),
        }
    }
}
