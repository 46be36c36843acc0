use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Local tuning for the uploader. Platform limits (file count, size, chunk
/// size) come from the server and live on the session context instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    pub request_timeout_secs: u64,
    /// `None` waits for the completion push forever.
    pub completion_timeout_secs: Option<u64>,
    /// `None` dispatches every chunk at once.
    pub max_concurrent_requests: Option<usize>,
    pub log_level: String,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            completion_timeout_secs: Some(300),
            max_concurrent_requests: None,
            log_level: "info".to_string(),
        }
    }
}

impl UploaderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("zpw-uploader");

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

/// Load the config from the user's config directory, creating it with
/// defaults on first use.
pub fn load_config() -> AppResult<UploaderConfig> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(config_path: &Path) -> AppResult<UploaderConfig> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        let config: UploaderConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            UploaderConfig::default()
        });

        validate_config(&config)?;

        Ok(config)
    } else {
        let default_config = UploaderConfig::default();
        save_config_to(config_path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &UploaderConfig) -> AppResult<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(config_path: &Path, config: &UploaderConfig) -> AppResult<()> {
    validate_config(config)?;

    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

pub fn validate_config(config: &UploaderConfig) -> AppResult<()> {
    if config.request_timeout_secs == 0 {
        return Err(AppError::validation(
            "request_timeout_secs",
            "Must be greater than 0",
        ));
    }

    if config.completion_timeout_secs == Some(0) {
        return Err(AppError::validation(
            "completion_timeout_secs",
            "Must be greater than 0 or unset",
        ));
    }

    if config.max_concurrent_requests == Some(0) {
        return Err(AppError::validation(
            "max_concurrent_requests",
            "Must be greater than 0 or unset",
        ));
    }

    let valid_log_levels = ["off", "error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = UploaderConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.max_concurrent_requests, None);
        assert_eq!(config.completion_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = UploaderConfig::default();
        config.max_concurrent_requests = Some(0);
        assert!(matches!(
            validate_config(&config),
            Err(AppError::Validation { .. })
        ));

        let mut config = UploaderConfig::default();
        config.completion_timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = UploaderConfig::default();
        config.request_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = UploaderConfig::default();
        config.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_creates_defaults_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let created = load_config_from(&path).unwrap();
        assert_eq!(created, UploaderConfig::default());
        assert!(path.exists());

        let mut changed = created.clone();
        changed.max_concurrent_requests = Some(4);
        changed.completion_timeout_secs = None;
        save_config_to(&path, &changed).unwrap();
        assert!(path.with_extension("json.bak").exists());

        assert_eq!(load_config_from(&path).unwrap(), changed);
    }

    #[test]
    fn test_partial_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{"max_concurrent_requests": 8}"#).unwrap();
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.max_concurrent_requests, Some(8));
        assert_eq!(config.request_timeout_secs, 120);

        fs::write(&path, "{not json").unwrap();
        assert_eq!(load_config_from(&path).unwrap(), UploaderConfig::default());
    }
}
