//! Conversational-AI backend adapter.
//!
//! The relay needs exactly two backend operations: open a dialogue session and
//! send one user turn into it. [`AssistantBackend`] is that surface;
//! [`AssistantClient`] implements it over the Assistant v2 REST API.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{Authenticator, IamTokenManager};
pub use client::AssistantClient;
pub use types::{CreateSessionResponse, MessageRequest, MessageResponse, RuntimeResponseGeneric};

use async_trait::async_trait;

/// Result type for assistant calls.
pub type AssistantResult<T> = Result<T, AssistantError>;

/// Assistant call failure.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Network error: {0}")]
    Http(String),

    #[error("Assistant returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed assistant response: {0}")]
    Decode(String),

    /// Session creation succeeded but returned no usable session id.
    #[error("Assistant returned an invalid session id: {0}")]
    InvalidSession(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for AssistantError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// The two backend operations the relay depends on.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Open a new dialogue session for the configured assistant.
    async fn create_session(&self) -> AssistantResult<CreateSessionResponse>;

    /// Send one user turn into `session_id`.
    async fn message(&self, session_id: &str, text: &str) -> AssistantResult<MessageResponse>;
}
