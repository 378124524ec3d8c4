//! Configuration validation for Sift.
//!
//! Checks that every configuration section holds values the gateway can
//! actually run with before any listener is bound.

use thiserror::Error;

use crate::logging::LogFormat;

use crate::config::{
    Config, ObservabilityConfig, ProviderConfig, QueryDefaultsConfig, ServerConfig,
    SessionsConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let results = [
            self.server.validate(),
            self.provider.validate(),
            self.sessions.validate(),
            self.observability.validate(),
            self.defaults.validate(),
        ];

        let mut errors: Vec<ValidationError> = results.into_iter().filter_map(Result::err).collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(crate::Error::from)?;
        Ok(config)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }

        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ProviderConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "provider.model".into(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "provider.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ValidationError::InvalidValue {
                field: "provider.base_backoff_ms".into(),
                reason: "must not exceed provider.max_backoff_ms".into(),
            });
        }

        Ok(())
    }
}

impl Validate for SessionsConfig {
    fn validate(&self) -> ValidationResult<()> {
        let positive = [
            ("sessions.ttl_secs", self.ttl_secs),
            ("sessions.max_sessions", self.max_sessions as u64),
            ("sessions.compact_query_threshold", self.compact_query_threshold),
            ("sessions.compact_token_threshold", self.compact_token_threshold),
            ("sessions.compact_max_attempts", u64::from(self.compact_max_attempts)),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: "must be greater than 0".into(),
                });
            }
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        if let Err(reason) = self.log_format.parse::<LogFormat>() {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason,
            });
        }

        Ok(())
    }
}

impl Validate for QueryDefaultsConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid = ["low", "medium", "high"];
        let fields = [
            ("defaults.reasoning_effort", &self.reasoning_effort),
            ("defaults.search_context_size", &self.search_context_size),
            ("defaults.verbosity", &self.verbosity),
        ];

        for (field, value) in fields {
            if !valid.contains(&value.to_lowercase().as_str()) {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: format!("must be one of: {}", valid.join(", ")),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "invalid".into();
        let result = config.validate();
        assert!(result.is_err());
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "observability.log_level");
        }
    }

    #[test]
    fn test_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test]
    fn test_zero_max_sessions() {
        let mut config = Config::default();
        config.sessions.max_sessions = 0;
        match config.validate() {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "sessions.max_sessions");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_default_level() {
        let mut config = Config::default();
        config.defaults.verbosity = "extreme".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_errors_aggregate() {
        let mut config = Config::default();
        config.provider.timeout_secs = 0;
        config.sessions.compact_max_attempts = 0;
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
