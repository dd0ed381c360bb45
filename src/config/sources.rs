use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "JOBRELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/jobrelay.toml";
const ENV_PREFIX: &str = "JOBRELAY";
const ENV_SEPARATOR: &str = "__";

const USERNAME_ENV_VAR: &str = "JOBRELAY_USERNAME";
const PASSWORD_ENV_VAR: &str = "JOBRELAY_PASSWORD";
const TOKEN_ENV_VAR: &str = "JOBRELAY_TOKEN";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = path.unwrap_or_else(|| {
        env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    });

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Credentials come from the environment only
fn load_secrets(config: &mut Config) {
    config.credentials.username = non_empty_var(USERNAME_ENV_VAR);
    config.credentials.password = non_empty_var(PASSWORD_ENV_VAR);
    config.credentials.token = non_empty_var(TOKEN_ENV_VAR);
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // JOBRELAY__API__BASE_URL -> api.base_url
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
