//! HTTP client for the job-processing API
//!
//! Thin typed layer over `reqwest`: builds URLs from the configured endpoint
//! templates, attaches bearer tokens and maps failures onto [`ClientError`].
//! It holds no credential state; callers pass the token per request.

mod error;
pub mod models;

pub use error::ClientError;
pub use models::{JobDetail, JobSummary, LoginResponse};

use crate::config::{ApiConfig, Config, Endpoints, HttpConfig};
use models::{JobsListResponse, LoginForm};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for the remote API
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
    request_timeout: Duration,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(api: &ApiConfig, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(http.connect_timeout())
            .user_agent(&http.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: api.base_url.trim().trim_end_matches('/').to_string(),
            endpoints: api.endpoints.clone(),
            request_timeout: http.request_timeout(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api, &config.http)
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Absolute URL for an endpoint template
    pub fn url(&self, template: &str, job_id: Option<&str>) -> String {
        let path = match job_id {
            Some(id) => Endpoints::render(template, id),
            None => template.to_string(),
        };

        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder.bearer_auth(token)
    }

    /// Exchange username/password for a bearer token
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let url = self.url(&self.endpoints.login, None);
        debug!(url, username, "Logging in");

        let response = self
            .client
            .post(&url)
            .form(&LoginForm { username, password })
            .timeout(self.request_timeout)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch the current status of one job
    pub async fn job_detail(&self, token: &str, job_id: &str) -> Result<JobDetail> {
        let url = self.url(&self.endpoints.jobs_detail, Some(job_id));

        let response = self
            .authorized(self.client.get(&url), token)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// List every job owned by the authenticated user
    pub async fn list_jobs(&self, token: &str) -> Result<Vec<JobSummary>> {
        let url = self.url(&self.endpoints.jobs_list, None);

        let response = self
            .authorized(self.client.get(&url), token)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body = response.bytes().await?;
        let list: JobsListResponse = serde_json::from_slice(&body)?;
        Ok(list.jobs)
    }

    /// Lightweight authenticated request used to confirm a token server-side.
    /// Returns the raw status; interpretation is up to the caller.
    pub async fn probe(&self, token: &str, timeout: Duration) -> Result<StatusCode> {
        let url = self.url(&self.endpoints.jobs_list, None);

        let response = self
            .authorized(self.client.get(&url), token)
            .timeout(timeout)
            .send()
            .await?;

        Ok(response.status())
    }

    /// Start streaming a job artifact. The status is checked, the body is not read.
    pub async fn retrieve(&self, token: &str, job_id: &str) -> Result<Response> {
        let url = self.url(&self.endpoints.retrieve, Some(job_id));
        debug!(url, job_id, "Requesting artifact");

        // No overall timeout: the body may take arbitrarily long to stream
        let response = self.authorized(self.client.get(&url), token).send().await?;
        check_status(response).await
    }

    /// Submit a file for processing. The response is returned unchecked since
    /// error bodies carry the message to surface.
    pub async fn create_from_file(
        &self,
        token: &str,
        form: Form,
        datatype_id: &str,
        image_type: &str,
        timeout: Duration,
    ) -> Result<Response> {
        let url = self.url(&self.endpoints.jobs_create_from_file, None);
        debug!(url, datatype_id, image_type, "Submitting file");

        let response = self
            .authorized(self.client.post(&url), token)
            .query(&[("datatype_id", datatype_id), ("image_type", image_type)])
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?;

        Ok(response)
    }
}

/// Turn a non-success response into a [`ClientError`], reading its body for the message
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::from_status(status, &body))
}
