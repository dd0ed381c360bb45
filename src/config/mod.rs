//! Configuration management for jobrelay
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use jobrelay::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("API at: {}", config.api.base_url);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `JOBRELAY__<section>__<key>`
//!
//! Examples:
//! - `JOBRELAY__API__BASE_URL=https://api.example.com`
//! - `JOBRELAY__POLLING__INTERVAL_SECONDS=2`
//! - `JOBRELAY__PROCESSING__MAX_UPLOAD_BYTES=512MB`
//!
//! Credentials are read from `JOBRELAY_USERNAME`, `JOBRELAY_PASSWORD` and
//! `JOBRELAY_TOKEN` and never from the file.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/jobrelay.toml`.
//! This can be overridden using the `JOBRELAY_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    ApiConfig, Config, CredentialsConfig, Endpoints, HttpConfig, PipelineConfig, PollingConfig,
    ProcessingConfig, TokenConfig, JOB_ID_PLACEHOLDER,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration with an explicit file path, still honouring the environment
    pub fn load_with_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load(Some(path))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path without reading secrets
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration built in code
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
