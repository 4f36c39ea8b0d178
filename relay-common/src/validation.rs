//! Configuration validation for relay services.
//!
//! Catches values that parse but cannot work (port 0, a malformed assistant
//! URL, credentials missing for the selected auth type) before the server
//! starts accepting messages.

use thiserror::Error;

use crate::config::{AssistantConfig, AuthType, Config, ObservabilityConfig, StorageConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16 },

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

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.network.port == 0 {
            errors.push(ValidationError::InvalidPort {
                port: self.network.port,
            });
        }

        for result in [
            self.storage.validate(),
            self.assistant.validate(),
            self.observability.validate(),
        ] {
            if let Err(e) = result {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> ValidationResult<()> {
        self.kind()
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidValue {
                field: "storageURL".into(),
                reason: e.to_string(),
            })
    }
}

impl Validate for AssistantConfig {
    fn validate(&self) -> ValidationResult<()> {
        match url::Url::parse(&self.service_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ValidationError::InvalidValue {
                    field: "SERVICE_URL".into(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                })
            }
            Err(e) => {
                return Err(ValidationError::InvalidValue {
                    field: "SERVICE_URL".into(),
                    reason: e.to_string(),
                })
            }
        }

        let auth = &self.auth;
        let missing = match auth.auth_type {
            AuthType::Iam if auth.apikey.is_none() => Some("ASSISTANT_APIKEY"),
            AuthType::Basic if auth.username.is_none() => Some("ASSISTANT_USERNAME"),
            AuthType::Basic if auth.password.is_none() => Some("ASSISTANT_PASSWORD"),
            AuthType::BearerToken if auth.bearer_token.is_none() => Some("ASSISTANT_BEARER_TOKEN"),
            _ => None,
        };

        match missing {
            Some(field) => Err(ValidationError::MissingField {
                field: field.into(),
            }),
            None => Ok(()),
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "LOG_LEVEL".into(),
                reason: format!("must be one of {valid_levels:?}"),
            });
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ValidationError::InvalidValue {
                field: "LOG_FORMAT".into(),
                reason: "must be 'pretty' or 'json'".into(),
            });
        }

        Ok(())
    }
}
