//! Configuration management for Drape.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. All config structs implement `Default`, so a missing file or a
//! missing section falls back to built-in values.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Drape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Vision-language model settings
    pub model: ModelConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Batch sizing
    pub batch: BatchConfig,

    /// Classification failure handling
    pub classification: ClassificationConfig,

    /// Optional attributes
    pub attributes: AttributesConfig,

    /// Worker host settings
    pub service: ServiceConfig,

    /// Directory processing settings
    pub processing: ProcessingConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.drape.drape/config.toml
    /// - Linux: ~/.config/drape/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\drape\config\config.toml
    ///
    /// Falls back to ~/.drape/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "drape", "drape")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".drape").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.general.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Directory holding the files of the configured model.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join(&self.model.name)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch.chunk_size, 32);
        assert_eq!(config.service.concurrency, 4);
        assert_eq!(config.model.logit_scale, 100.0);
        assert_eq!(config.classification.failure_policy, FailurePolicy::Degrade);
        assert!(config.attributes.gender);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[batch]"));
        assert!(toml.contains("failure_policy = \"degrade\""));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [classification]
            failure_policy = "fail_fast"

            [batch]
            chunk_size = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.classification.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.batch.chunk_size, 8);
        assert_eq!(config.limits.decode_timeout_ms, 5000);
    }

    #[test]
    fn test_invalid_toml_values_rejected() {
        let err = Config::from_toml("[service]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model]\nname = \"fashion-clip-onnx\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model.name, "fashion-clip-onnx");
        assert!(config.model_path().ends_with("fashion-clip-onnx"));
    }
}
