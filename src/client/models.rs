//! Wire models for the job-processing API.
//!
//! The server is loosely typed: identifiers and status codes arrive as numbers
//! or strings depending on the deployment, so the models keep those fields as
//! [`Value`] and expose normalized accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `POST <login>` response
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

/// Form body for the login exchange
#[derive(Serialize)]
pub(crate) struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// `GET <jobs_detail(job_id)>` response
#[derive(Debug, Clone, Deserialize)]
pub struct JobDetail {
    pub status: String,
    #[serde(default)]
    pub status_code: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub resource_url: Option<String>,
    #[serde(default)]
    pub body: Value,
}

impl JobDetail {
    /// Numeric status code, 0 when absent or unparseable
    pub fn status_code(&self) -> i64 {
        match &self.status_code {
            Value::Number(n) => n.as_i64().unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        }
    }

    pub fn result_message(&self) -> String {
        value_to_string(&self.result).unwrap_or_default()
    }

    pub fn has_resource(&self) -> bool {
        self.resource_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    pub fn datatype_id(&self) -> Option<String> {
        self.body.get("datatype_id").and_then(value_to_string)
    }
}

/// `GET <jobs_list>` response
#[derive(Debug, Deserialize)]
pub struct JobsListResponse {
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

/// One entry of the jobs listing, kept as the server sent it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSummary(pub Map<String, Value>);

impl JobSummary {
    pub fn id(&self) -> Option<String> {
        self.0.get("id").and_then(value_to_string)
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }
}

/// Render a scalar JSON value as text; `null` yields `None`
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Human-readable message from an error body: the `detail` field when the
/// body is JSON carrying one, otherwise the raw body. Empty bodies yield `None`.
pub fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => match json.get("detail").and_then(value_to_string) {
            Some(detail) => Some(detail),
            None => Some(json.to_string()),
        },
        Err(_) => Some(trimmed.to_string()),
    }
}
