use super::models::{Config, JOB_ID_PLACEHOLDER};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("api.base_url is not set")]
    MissingBaseUrl,

    #[error("api.base_url '{url}' is not a valid URL: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Endpoint '{endpoint}' template '{template}' must contain {{job_id}}")]
    MissingJobIdPlaceholder { endpoint: String, template: String },

    #[error("Token lifetime must be positive")]
    ZeroTokenLifetime,

    #[error("Token expiration buffer ({buffer} min) must be shorter than its lifetime ({lifetime} min)")]
    BufferExceedsLifetime { buffer: u64, lifetime: u64 },

    #[error("Polling duration must be positive: {field} = {value}")]
    InvalidPollingDuration { field: String, value: f64 },

    #[error("processing.chunk_size must be positive")]
    ZeroChunkSize,

    #[error("processing.max_upload_bytes must be positive")]
    ZeroUploadLimit,

    #[error("Pipeline '{0}' is defined more than once")]
    DuplicatePipeline(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_api(config)?;
    validate_token(config)?;
    validate_polling(config)?;
    validate_processing(config)?;
    validate_pipelines(config)?;
    Ok(())
}

fn validate_api(config: &Config) -> Result<(), ValidationError> {
    let base_url = config.api.base_url.trim();
    if base_url.is_empty() {
        return Err(ValidationError::MissingBaseUrl);
    }

    reqwest::Url::parse(base_url).map_err(|e| ValidationError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    let endpoints = &config.api.endpoints;
    for (endpoint, template) in [
        ("jobs_detail", &endpoints.jobs_detail),
        ("retrieve", &endpoints.retrieve),
    ] {
        if !template.contains(JOB_ID_PLACEHOLDER) {
            return Err(ValidationError::MissingJobIdPlaceholder {
                endpoint: endpoint.to_string(),
                template: template.clone(),
            });
        }
    }

    Ok(())
}

fn validate_token(config: &Config) -> Result<(), ValidationError> {
    let token = &config.token;
    if token.lifetime_minutes == 0 {
        return Err(ValidationError::ZeroTokenLifetime);
    }

    if token.expiration_buffer_minutes >= token.lifetime_minutes {
        return Err(ValidationError::BufferExceedsLifetime {
            buffer: token.expiration_buffer_minutes,
            lifetime: token.lifetime_minutes,
        });
    }

    Ok(())
}

fn validate_polling(config: &Config) -> Result<(), ValidationError> {
    let polling = &config.polling;
    for (field, value) in [
        ("interval_seconds", polling.interval_seconds),
        ("error_sleep_seconds", polling.error_sleep_seconds),
        ("registry_interval_seconds", polling.registry_interval_seconds),
    ] {
        if !(value.is_finite() && value > 0.0) {
            return Err(ValidationError::InvalidPollingDuration {
                field: field.to_string(),
                value,
            });
        }
    }

    Ok(())
}

fn validate_processing(config: &Config) -> Result<(), ValidationError> {
    if config.processing.chunk_size == 0 {
        return Err(ValidationError::ZeroChunkSize);
    }

    if config.processing.max_upload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroUploadLimit);
    }

    Ok(())
}

fn validate_pipelines(config: &Config) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for pipeline in &config.pipelines {
        if !seen.insert(pipeline.name.as_str()) {
            return Err(ValidationError::DuplicatePipeline(pipeline.name.clone()));
        }
    }

    Ok(())
}
