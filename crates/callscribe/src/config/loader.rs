use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads the file when a path is given, otherwise validates and returns the
/// built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = Config::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker.max_retries < 1 {
        return Err(ConfigError::Validation {
            message: "worker.max_retries must be at least 1".to_string(),
        });
    }

    if config.worker.concurrency < 1 {
        return Err(ConfigError::Validation {
            message: "worker.concurrency must be at least 1".to_string(),
        });
    }

    if config.dispatcher.admission_ceiling < 1 {
        return Err(ConfigError::Validation {
            message: "dispatcher.admission_ceiling must be at least 1".to_string(),
        });
    }

    // A live worker must always touch its record well inside the stuck window.
    if config.worker.heartbeat_interval_secs >= config.dispatcher.stuck_threshold_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "worker.heartbeat_interval_secs ({}) must be less than dispatcher.stuck_threshold_secs ({})",
                config.worker.heartbeat_interval_secs, config.dispatcher.stuck_threshold_secs
            ),
        });
    }

    if config.watcher.sync.enabled && config.watcher.sync.source_dir.is_none() {
        return Err(ConfigError::Validation {
            message: "watcher.sync.source_dir is required when sync is enabled".to_string(),
        });
    }

    if let Some(ext) = config.audio_extensions.iter().find(|e| !e.starts_with('.')) {
        return Err(ConfigError::Validation {
            message: format!("Audio extension '{}' must start with '.'", ext),
        });
    }

    Ok(())
}
