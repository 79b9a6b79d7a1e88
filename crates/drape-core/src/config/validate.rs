//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

/// Upper bound for `limits.max_payload_mb` (1 GiB).
const MAX_PAYLOAD_MB: u64 = 1024;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.model.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.image_size must be > 0".into(),
            ));
        }
        if !self.model.logit_scale.is_finite() || self.model.logit_scale <= 0.0 {
            return Err(ConfigError::ValidationError(
                "model.logit_scale must be finite and > 0".into(),
            ));
        }
        if self.model.max_text_length == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_text_length must be > 0".into(),
            ));
        }
        if self.limits.max_payload_mb == 0 || self.limits.max_payload_mb > MAX_PAYLOAD_MB {
            return Err(ConfigError::ValidationError(format!(
                "limits.max_payload_mb must be between 1 and {MAX_PAYLOAD_MB}"
            )));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.encode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.encode_timeout_ms must be > 0".into(),
            ));
        }
        if self.batch.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch.chunk_size must be > 0".into(),
            ));
        }
        if self.service.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "service.concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.batch.chunk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.decode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_non_positive_logit_scale() {
        let mut config = Config::default();
        config.model.logit_scale = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logit_scale"));

        config.model.logit_scale = f32::NAN;
        assert!(config.validate().is_err());

        config.model.logit_scale = f32::INFINITY;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("finite"));
    }

    #[test]
    fn test_validate_bounds_payload_limit() {
        let mut config = Config::default();
        config.limits.max_payload_mb = 18_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_payload_mb"));

        config.limits.max_payload_mb = MAX_PAYLOAD_MB;
        assert!(config.validate().is_ok());

        config.limits.max_payload_mb = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.service.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("service.concurrency"));
    }
}
