use std::path::{Path, PathBuf};

use thiserror::Error;

mod schema;

pub use schema::{
    AccessControlConfig, AccessControlMode, AuthConfig, Config, OutboxConfig, WorkflowConfig,
    CURRENT_CONFIG_VERSION,
};

pub const CONFIG_PATH_ENV: &str = "FEEDBACK_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `FEEDBACK_CONFIG_PATH` when set, otherwise `config.json` in the asset dir.
pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
        _ => Ok(utils::assets::config_path()?),
    }
}

/// Will always return config, falling back to defaults on missing/invalid files.
pub async fn load_config_from_file(config_path: &Path) -> Config {
    match tokio::fs::read_to_string(config_path).await {
        Ok(raw_config) => Config::from_raw(&raw_config),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                tracing::info!(path = %config_path.display(), "No config file found, using defaults");
            } else {
                tracing::warn!("Failed to read config file: {}", err);
            }
            Config::default()
        }
    }
}

/// File values, then process environment on top.
pub async fn load_runtime_config(config_path: &Path) -> Config {
    load_config_from_file(config_path)
        .await
        .with_env_overrides(|name| std::env::var(name).ok())
}
