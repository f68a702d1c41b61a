use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "AUDITBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/auditbox.toml";
const ENV_PREFIX: &str = "AUDITBOX";
const ENV_SEPARATOR: &str = "__";

/// Path of the configuration file: `AUDITBOX_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Environment-only secrets, first match wins for each slot.
const S3_ACCESS_KEY_VARS: &[&str] = &["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"];
const S3_SECRET_KEY_VARS: &[&str] = &["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"];
const SEARCH_PASSWORD_VARS: &[&str] = &["OPENSEARCH_PASSWORD"];

/// Read `path` (or the default location) plus `.env` and process
/// environment, then fill the secret slots.
pub fn load(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(path.unwrap_or_else(default_path))?;
    apply_secrets(&mut config, |name| env::var(name).ok());
    Ok(config)
}

fn first_set(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| lookup(name).filter(|value| !value.is_empty()))
}

fn apply_secrets(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = first_set(&lookup, S3_ACCESS_KEY_VARS) {
        config.storage.access_key = Some(key);
    }
    if let Some(secret) = first_set(&lookup, S3_SECRET_KEY_VARS) {
        config.storage.secret_key = Some(secret);
    }
    if let Some(password) = first_set(&lookup, SEARCH_PASSWORD_VARS) {
        config.search.password = Some(password);
    }
}

/// File layer plus `AUDITBOX__*` overrides, without secrets.
pub fn load_from_sources(path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if path.exists() {
        tracing::info!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(path).required(false));
    } else {
        tracing::warn!(
            path = %path.display(),
            "No configuration file, using defaults and environment"
        );
    }

    // AUDITBOX__WORKER__BATCH_SIZE -> worker.batch_size
    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
