//! Session binding persistence.

use async_trait::async_trait;
use dashmap::DashMap;

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Session store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage request failed: {0}")]
    Http(String),

    #[error("Storage returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Maps a conversation id to the remote session id bound to it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    async fn get(&self, conversation_id: &str) -> StoreResult<Option<String>>;

    async fn set(&self, conversation_id: &str, session_id: &str) -> StoreResult<()>;

    /// Remove a binding. Removing a missing binding is not an error.
    async fn delete(&self, conversation_id: &str) -> StoreResult<()>;
}

/// Process-local session store. Bindings are lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    bindings: DashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, conversation_id: &str) -> StoreResult<Option<String>> {
        Ok(self.bindings.get(conversation_id).map(|v| v.value().clone()))
    }

    async fn set(&self, conversation_id: &str, session_id: &str) -> StoreResult<()> {
        self.bindings
            .insert(conversation_id.to_string(), session_id.to_string());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<()> {
        self.bindings.remove(conversation_id);
        Ok(())
    }
}
