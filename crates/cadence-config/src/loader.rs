//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use chrono_tz::Tz;
use thiserror::Error;

use crate::CadenceConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load and validate configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<CadenceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: CadenceConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

pub fn validate_config(config: &CadenceConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    let planner = &config.planner;
    if !(0.0..=2.0).contains(&planner.temperature) {
        return Err(ConfigError::Invalid(format!(
            "planner.temperature must be within [0, 2], got {}",
            planner.temperature
        )));
    }
    if !(0.0..=1.0).contains(&planner.confidence_threshold) {
        return Err(ConfigError::Invalid(format!(
            "planner.confidence_threshold must be within [0, 1], got {}",
            planner.confidence_threshold
        )));
    }
    if planner.model.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "planner.model must not be empty".to_string(),
        ));
    }

    if config.cache.ttl_secs == 0 {
        return Err(ConfigError::Invalid("cache.ttl_secs must be > 0".to_string()));
    }
    if config.cache.max_entries == 0 {
        return Err(ConfigError::Invalid(
            "cache.max_entries must be > 0".to_string(),
        ));
    }

    if config.ledger.max_operations == 0 {
        return Err(ConfigError::Invalid(
            "ledger.max_operations must be > 0".to_string(),
        ));
    }

    if config.context.timezone.parse::<Tz>().is_err() {
        return Err(ConfigError::Invalid(format!(
            "context.timezone '{}' is not an IANA timezone",
            config.context.timezone
        )));
    }
    if config.context.fetch_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "context.fetch_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.provider.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "provider.endpoint must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlannerMode;

    fn write_temp(content: &str) -> std::path::PathBuf {
        let path =
            std::env::temp_dir().join(format!("cadence-config-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(&path, content).expect("write config");
        path
    }

    #[test]
    fn test_validate_config_accepts_defaults() {
        assert!(validate_config(&CadenceConfig::default()).is_ok());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let path = write_temp(
            "version: 1\nplanner:\n  mode: keyword\n  temperature: 0.3\ncontext:\n  timezone: Europe/Berlin\n",
        );
        let config = load_config(&path).expect("load");
        fs::remove_file(&path).ok();

        assert_eq!(config.planner.mode, PlannerMode::Keyword);
        assert_eq!(config.planner.temperature, 0.3);
        assert_eq!(config.planner.max_history_turns, 3);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.ledger.max_operations, 50);
        assert_eq!(config.context.timezone, "Europe/Berlin");
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = CadenceConfig::default();
        config.cache.max_entries = 0;
        assert!(matches!(validate_config(&config), Err(ConfigError::Invalid(_))));

        let mut config = CadenceConfig::default();
        config.context.timezone = "Mars/Olympus".to_string();
        assert!(matches!(validate_config(&config), Err(ConfigError::Invalid(_))));

        let mut config = CadenceConfig::default();
        config.planner.confidence_threshold = 1.5;
        assert!(matches!(validate_config(&config), Err(ConfigError::Invalid(_))));

        let mut config = CadenceConfig::default();
        config.version = 0;
        assert!(matches!(validate_config(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let path = write_temp("planner:\n  mode: telepathy\n");
        let result = load_config(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/cadence.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
