//! Connector traits for sending replies back to a conversation.

use crate::message::ConversationReference;
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

/// Outbound side of the chat transport.
///
/// The bridge only ever needs to post plain text into the conversation an
/// inbound message came from.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    /// Get the connector name.
    fn name(&self) -> &'static str;

    /// Send a plain-text message into the referenced conversation.
    ///
    /// Returns the id the transport assigned to the new activity (may be empty).
    async fn send_text(&self, reference: &ConversationReference, text: &str)
        -> ChannelResult<String>;
}
