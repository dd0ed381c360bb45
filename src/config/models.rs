use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder substituted by [`Endpoints::render`]
pub const JOB_ID_PLACEHOLDER: &str = "{job_id}";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    /// Image type label -> value sent as the `image_type` upload parameter
    #[serde(default)]
    pub image_types: BTreeMap<String, String>,
    /// Loaded from environment only
    #[serde(skip)]
    pub credentials: CredentialsConfig,
}

/// Remote API location
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Endpoint path templates, relative to `api.base_url`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Endpoints {
    #[serde(default = "default_login")]
    pub login: String,
    #[serde(default = "default_jobs_list")]
    pub jobs_list: String,
    #[serde(default = "default_jobs_detail")]
    pub jobs_detail: String,
    #[serde(default = "default_retrieve")]
    pub retrieve: String,
    #[serde(default = "default_jobs_create_from_file")]
    pub jobs_create_from_file: String,
}

impl Endpoints {
    /// Substitute `{job_id}` in a path template
    pub fn render(template: &str, job_id: &str) -> String {
        template.replace(JOB_ID_PLACEHOLDER, job_id)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: default_login(),
            jobs_list: default_jobs_list(),
            jobs_detail: default_jobs_detail(),
            retrieve: default_retrieve(),
            jobs_create_from_file: default_jobs_create_from_file(),
        }
    }
}

fn default_login() -> String {
    "/auth/login".to_string()
}

fn default_jobs_list() -> String {
    "/jobs/".to_string()
}

fn default_jobs_detail() -> String {
    "/jobs/{job_id}".to_string()
}

fn default_retrieve() -> String {
    "/retrieve/{job_id}".to_string()
}

fn default_jobs_create_from_file() -> String {
    "/jobs/create_from_file".to_string()
}

/// Bearer token lifetime estimation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: u64,
    #[serde(default = "default_expiration_buffer_minutes")]
    pub expiration_buffer_minutes: u64,
    /// Seconds
    #[serde(default = "default_api_validation_timeout")]
    pub api_validation_timeout: u64,
    /// Minimum gap between two remote validations on the request path
    #[serde(default = "default_validation_interval_ms")]
    pub validation_interval_ms: u64,
}

impl TokenConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_minutes * 60)
    }

    pub fn buffer(&self) -> Duration {
        Duration::from_secs(self.expiration_buffer_minutes * 60)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.api_validation_timeout)
    }

    pub fn validation_interval(&self) -> Duration {
        Duration::from_millis(self.validation_interval_ms)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime_minutes: default_lifetime_minutes(),
            expiration_buffer_minutes: default_expiration_buffer_minutes(),
            api_validation_timeout: default_api_validation_timeout(),
            validation_interval_ms: default_validation_interval_ms(),
        }
    }
}

fn default_lifetime_minutes() -> u64 {
    6000
}

fn default_expiration_buffer_minutes() -> u64 {
    5
}

fn default_api_validation_timeout() -> u64 {
    10
}

fn default_validation_interval_ms() -> u64 {
    60_000
}

/// Poll cadence. Fractional seconds are accepted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
    #[serde(default = "default_error_sleep_seconds")]
    pub error_sleep_seconds: f64,
    #[serde(default = "default_registry_interval_seconds")]
    pub registry_interval_seconds: f64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        secs(self.interval_seconds)
    }

    pub fn error_sleep(&self) -> Duration {
        secs(self.error_sleep_seconds)
    }

    pub fn registry_interval(&self) -> Duration {
        secs(self.registry_interval_seconds)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            error_sleep_seconds: default_error_sleep_seconds(),
            registry_interval_seconds: default_registry_interval_seconds(),
        }
    }
}

fn default_interval_seconds() -> f64 {
    1.0
}

fn default_error_sleep_seconds() -> f64 {
    5.0
}

fn default_registry_interval_seconds() -> f64 {
    30.0
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Transfer tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_temp_dir_prefix")]
    pub temp_dir_prefix: String,
    /// Directory under which artifacts are created (system temp dir when unset)
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
    #[serde(default = "default_upload_timeout_seconds")]
    pub upload_timeout_seconds: u64,
}

impl ProcessingConfig {
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_seconds)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            temp_dir_prefix: default_temp_dir_prefix(),
            temp_root: None,
            max_upload_bytes: default_max_upload_bytes(),
            upload_timeout_seconds: default_upload_timeout_seconds(),
        }
    }
}

fn default_chunk_size() -> usize {
    8192
}

fn default_temp_dir_prefix() -> String {
    "jobrelay_".to_string()
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize(1024 * 1024 * 1024) // 1 GiB
}

fn default_upload_timeout_seconds() -> u64 {
    6000
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Applies to login, status and listing calls
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_user_agent() -> String {
    concat!("jobrelay/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Processing pipeline offered by the server
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub name: String,
    /// Value sent as `datatype_id`
    pub pipeline: String,
    #[serde(default)]
    pub description: String,
    /// Default image type label for this pipeline
    #[serde(default)]
    pub image: Option<String>,
}

/// Login secrets, never read from the TOML file
#[derive(Clone, Default)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Pre-issued bearer token
    pub token: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// Pipeline lookup by display name
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    /// API value for an image label. Matches case-insensitively, since config
    /// sources may normalize table keys.
    pub fn image_type(&self, label: &str) -> Option<&str> {
        self.image_types
            .get(label)
            .or_else(|| {
                self.image_types
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(label))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }
}
