//! Conversation → assistant session resolution.

use super::store::SessionStore;
use crate::assistant::{AssistantBackend, AssistantError};
use crate::bridge::RelayError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Finds or creates the assistant session bound to a conversation.
///
/// Resolution for one conversation is single-flight: concurrent first
/// messages wait on a per-conversation lock, so only one creation call is
/// made and every caller sees the same session id.
pub struct SessionResolver {
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn AssistantBackend>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn SessionStore>, backend: Arc<dyn AssistantBackend>) -> Self {
        Self {
            store,
            backend,
            inflight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Return the session bound to `conversation_id`, creating one if needed.
    pub async fn resolve(&self, conversation_id: &str) -> Result<String, RelayError> {
        if let Some(session_id) = self.store.get(conversation_id).await? {
            tracing::debug!(session_id = %session_id, "Reusing session");
            return Ok(session_id);
        }

        let lock = self
            .inflight
            .entry(conversation_id.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(conversation_id).await
        };

        drop(lock);
        self.inflight
            .remove_if(conversation_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn resolve_locked(&self, conversation_id: &str) -> Result<String, RelayError> {
        // Another task may have created the session while we waited.
        if let Some(session_id) = self.store.get(conversation_id).await? {
            return Ok(session_id);
        }

        let created = self
            .backend
            .create_session()
            .await
            .and_then(|response| {
                response
                    .session_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| AssistantError::InvalidSession("missing or empty session_id".into()))
            });

        match created {
            Ok(session_id) => {
                tracing::info!(session_id = %session_id, "Session created");
                self.store.set(conversation_id, &session_id).await?;
                Ok(session_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Session creation failed");
                if let Err(store_err) = self.store.delete(conversation_id).await {
                    tracing::warn!(error = %store_err, "Failed to clear session binding");
                }
                Err(RelayError::SessionCreationFailed(e))
            }
        }
    }

    /// Drop the binding for `conversation_id`. Idempotent.
    pub async fn reset(&self, conversation_id: &str) -> Result<(), RelayError> {
        self.store.delete(conversation_id).await?;
        tracing::info!("Session binding cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantResult, CreateSessionResponse, MessageResponse};
    use crate::session::store::MemorySessionStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Backend that hands out numbered sessions, or a fixed reply.
    struct CountingBackend {
        creations: AtomicUsize,
        reply: Option<AssistantResult<Option<String>>>,
        delay: Duration,
    }

    impl CountingBackend {
        fn numbered() -> Self {
            Self {
                creations: AtomicUsize::new(0),
                reply: None,
                delay: Duration::ZERO,
            }
        }

        fn replying(reply: AssistantResult<Option<String>>) -> Self {
            Self {
                reply: Some(reply),
                ..Self::numbered()
            }
        }

        fn creations(&self) -> usize {
            self.creations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AssistantBackend for CountingBackend {
        async fn create_session(&self) -> AssistantResult<CreateSessionResponse> {
            let n = self.creations.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let session_id = match &self.reply {
                None => Some(format!("sess-{n}")),
                Some(Ok(id)) => id.clone(),
                Some(Err(e)) => return Err(AssistantError::Http(e.to_string())),
            };
            Ok(CreateSessionResponse { session_id })
        }

        async fn message(&self, _session_id: &str, _text: &str) -> AssistantResult<MessageResponse> {
            Ok(MessageResponse::default())
        }
    }

    fn resolver(backend: Arc<CountingBackend>) -> (Arc<MemorySessionStore>, SessionResolver) {
        let store = Arc::new(MemorySessionStore::new());
        let resolver = SessionResolver::new(store.clone(), backend);
        (store, resolver)
    }

    #[tokio::test]
    async fn test_first_resolve_creates_once() {
        let backend = Arc::new(CountingBackend::numbered());
        let (store, resolver) = resolver(backend.clone());

        assert_eq!(resolver.resolve("conv-1").await.unwrap(), "sess-1");
        assert_eq!(resolver.resolve("conv-1").await.unwrap(), "sess-1");
        assert_eq!(backend.creations(), 1);
        assert_eq!(store.get("conv-1").await.unwrap().as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let backend = Arc::new(CountingBackend::numbered());
        let (_store, resolver) = resolver(backend.clone());

        let a = resolver.resolve("conv-a").await.unwrap();
        let b = resolver.resolve("conv-b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.creations(), 2);
    }

    #[tokio::test]
    async fn test_reset_forces_new_session() {
        let backend = Arc::new(CountingBackend::numbered());
        let (store, resolver) = resolver(backend.clone());

        resolver.resolve("conv-1").await.unwrap();
        resolver.reset("conv-1").await.unwrap();
        resolver.reset("conv-1").await.unwrap();
        assert!(store.is_empty());

        assert_eq!(resolver.resolve("conv-1").await.unwrap(), "sess-2");
        assert_eq!(backend.creations(), 2);
    }

    #[tokio::test]
    async fn test_empty_session_id_is_failure() {
        for reply in [Ok(None), Ok(Some(String::new()))] {
            let backend = Arc::new(CountingBackend::replying(reply));
            let (store, resolver) = resolver(backend);

            let err = resolver.resolve("conv-1").await.unwrap_err();
            assert!(matches!(
                err,
                RelayError::SessionCreationFailed(AssistantError::InvalidSession(_))
            ));
            assert!(err.to_string().contains("invalid session id"));
            assert!(store.is_empty());
        }
    }

    #[tokio::test]
    async fn test_creation_error_leaves_no_binding() {
        let backend = Arc::new(CountingBackend::replying(Err(AssistantError::Http(
            "connection refused".into(),
        ))));
        let (store, resolver) = resolver(backend.clone());

        let err = resolver.resolve("conv-1").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert!(store.is_empty());

        // Retried transparently on the next message.
        let _ = resolver.resolve("conv-1").await;
        assert_eq!(backend.creations(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_messages_create_one_session() {
        let backend = Arc::new(CountingBackend {
            delay: Duration::from_millis(20),
            ..CountingBackend::numbered()
        });
        let (_store, resolver) = resolver(backend.clone());

        let (a, b, c) = tokio::join!(
            resolver.resolve("conv-1"),
            resolver.resolve("conv-1"),
            resolver.resolve("conv-1"),
        );

        assert_eq!(backend.creations(), 1);
        assert_eq!(a.unwrap(), "sess-1");
        assert_eq!(b.unwrap(), "sess-1");
        assert_eq!(c.unwrap(), "sess-1");
        assert!(resolver.inflight.is_empty());
    }
}
