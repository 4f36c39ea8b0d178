//! Relay between the chat connector and the assistant.
//!
//! Each inbound [`ChannelMessage`] runs in its own task through:
//! sanitize → optional reset → resolve session → send turn → post text replies.
//! Failures never escape a task; they become a single error reply.

use crate::assistant::{AssistantBackend, AssistantError};
use crate::message::ChannelMessage;
use crate::sanitize::{sanitize, SanitizedText};
use crate::session::{SessionResolver, StoreError};
use crate::traits::ChatConnector;
use relay_common::util::truncate_with_ellipsis;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Relay failure.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No session could be opened; no binding was kept.
    #[error("could not establish an assistant session: {0}")]
    SessionCreationFailed(#[source] AssistantError),

    /// The message call failed; the binding is kept.
    #[error("{0}")]
    RelayFailed(#[source] AssistantError),

    #[error("session store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl RelayError {
    /// Text sent back to the user for this failure.
    pub fn user_message(&self) -> String {
        format!("ERROR: {self}")
    }
}

/// Connects inbound chat messages to assistant sessions.
pub struct Bridge {
    resolver: SessionResolver,
    backend: Arc<dyn AssistantBackend>,
    connector: Arc<dyn ChatConnector>,
}

impl Bridge {
    pub fn new(
        resolver: SessionResolver,
        backend: Arc<dyn AssistantBackend>,
        connector: Arc<dyn ChatConnector>,
    ) -> Self {
        Self {
            resolver,
            backend,
            connector,
        }
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    /// Send one sanitized turn and return the assistant's text replies in order.
    pub async fn relay(
        &self,
        conversation_id: &str,
        text: &SanitizedText,
    ) -> Result<Vec<String>, RelayError> {
        let session_id = self.resolver.resolve(conversation_id).await?;

        let response = self
            .backend
            .message(&session_id, text.as_str())
            .instrument(tracing::debug_span!("assistant_message", session_id = %session_id))
            .await
            .map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Assistant message failed");
                RelayError::RelayFailed(e)
            })?;

        Ok(response.text_replies())
    }

    /// Work out the replies for one inbound message.
    ///
    /// Always yields something to send: the assistant's text replies, or a
    /// single error message.
    pub async fn handle(&self, message: &ChannelMessage) -> Vec<String> {
        tracing::debug!(
            user_id = %message.user_id,
            text = %message.text,
            "Message received"
        );

        let text = sanitize(&message.text);

        if text.is_reset_command() {
            tracing::info!("Starting a new conversation");
            if let Err(e) = self.resolver.reset(&message.conversation_id).await {
                tracing::error!(error = %e, "Failed to reset session");
                return vec![e.user_message()];
            }
        }

        match self.relay(&message.conversation_id, &text).await {
            Ok(replies) => replies,
            Err(e) => {
                tracing::error!(error = %e, "Relay failed");
                vec![e.user_message()]
            }
        }
    }

    /// Handle one inbound message end to end, posting every reply in order.
    pub async fn process(&self, message: ChannelMessage) {
        let span = tracing::info_span!(
            "relay",
            trace_id = %message.trace_id,
            conversation_id = %message.conversation_id,
            message_id = %message.id,
        );

        async {
            let replies = self.handle(&message).await;

            for reply in replies {
                tracing::debug!(reply = %truncate_with_ellipsis(&reply, 200), "Sending reply");
                if let Err(e) = self.connector.send_text(&message.reference, &reply).await {
                    tracing::error!(
                        connector = self.connector.name(),
                        error = %e,
                        "Failed to send reply"
                    );
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Spawn the processor loop; each message is handled in its own task.
    ///
    /// The loop ends once every sender is dropped, after the in-flight
    /// message tasks have finished.
    pub fn spawn_processor(
        bridge: Arc<Self>,
        mut rx: mpsc::Receiver<ChannelMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Relay processor started");

            let mut tasks = JoinSet::new();
            loop {
                tokio::select! {
                    message = rx.recv() => match message {
                        Some(message) => {
                            let bridge = bridge.clone();
                            tasks.spawn(async move {
                                bridge.process(message).await;
                            });
                        }
                        None => break,
                    },
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        log_task_exit(joined);
                    }
                }
            }

            if !tasks.is_empty() {
                tracing::info!(pending = tasks.len(), "Waiting for in-flight messages");
            }
            while let Some(joined) = tasks.join_next().await {
                log_task_exit(joined);
            }

            tracing::info!("Relay processor stopped");
        })
    }
}

fn log_task_exit(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Message task failed");
    }
}
