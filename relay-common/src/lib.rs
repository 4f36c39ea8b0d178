//! Relay Common - Shared configuration, errors, and logging for the relay services.
//!
//! This crate provides:
//! - Environment-sourced configuration and its validation
//! - The startup error type (`ConfigMissing` and friends)
//! - Logging setup and trace ID helpers
//! - Small string utilities (truncation, secret masking)

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    AssistantAuthConfig, AssistantConfig, AuthType, Config, ConnectorConfig, NetworkConfig,
    ObservabilityConfig, StorageConfig, StorageKind,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
