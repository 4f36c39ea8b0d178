//! Error types shared by the relay services.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for service startup and shared plumbing.
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory configuration value is absent. Fatal at startup.
    #[error("{0} must be specified in environment")]
    ConfigMissing(String),

    /// A configuration value is present but unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error means a mandatory setting is missing.
    pub fn is_config_missing(&self) -> bool {
        match self {
            Self::ConfigMissing(_) => true,
            Self::WithContext { source, .. } => source.is_config_missing(),
            _ => false,
        }
    }

    /// Process exit code to use when this error aborts startup.
    pub fn exit_code(&self) -> i32 {
        if self.is_config_missing() {
            1
        } else {
            2
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
