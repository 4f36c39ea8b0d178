//! HTTP routes for the relay.
//!
//! - `POST /api/messages`: Bot Framework activity webhook
//! - `GET /health`, `GET /ready`: probes

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::message::{Activity, ChannelMessage};

/// Capacity of the webhook → processor queue.
pub const MESSAGE_QUEUE_CAPACITY: usize = 100;

// ============================================================================
// State
// ============================================================================

/// Shared state for the relay HTTP server.
pub struct ChannelsState {
    /// Channel for forwarding incoming messages to the bridge processor
    pub message_tx: mpsc::Sender<ChannelMessage>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Health Routes
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "relay-channels",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<Arc<ChannelsState>>) -> impl IntoResponse {
    if state.message_tx.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready",
                service: "relay-channels",
                version: env!("CARGO_PKG_VERSION"),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready",
            service: "relay-channels",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ============================================================================
// Activity Webhook
// ============================================================================

async fn messages_webhook(
    State(state): State<Arc<ChannelsState>>,
    body: String,
) -> axum::response::Response {
    let activity: Activity = match serde_json::from_str(&body) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed activity");
            return error(StatusCode::BAD_REQUEST, format!("Invalid activity: {e}"));
        }
    };

    let activity_type = activity.activity_type;
    let message = match ChannelMessage::from_activity(activity) {
        Ok(Some(message)) => message,
        Ok(None) => {
            tracing::debug!(activity_type = ?activity_type, "Ignoring activity");
            return StatusCode::ACCEPTED.into_response();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejected activity");
            return error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    tracing::info!(
        trace_id = %message.trace_id,
        conversation_id = %message.conversation_id,
        "Activity received"
    );

    if let Err(e) = state.message_tx.send(message).await {
        tracing::error!(error = %e, "Relay processor unavailable");
        return error(StatusCode::SERVICE_UNAVAILABLE, "Relay processor unavailable");
    }

    StatusCode::ACCEPTED.into_response()
}

// ============================================================================
// Router
// ============================================================================

/// Build the relay router.
pub fn build_router(state: Arc<ChannelsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/messages", post(messages_webhook))
        .with_state(state)
}

/// Create the relay state with its message receiver.
pub fn create_state() -> (Arc<ChannelsState>, mpsc::Receiver<ChannelMessage>) {
    let (tx, rx) = mpsc::channel(MESSAGE_QUEUE_CAPACITY);
    (Arc::new(ChannelsState { message_tx: tx }), rx)
}
