//! Relay Channels - Chat connector bridge to a conversational-AI assistant.
//!
//! Receives Bot Framework activities on a webhook, relays each user message
//! into the assistant session bound to its conversation, and posts the
//! assistant's text replies back through the connector.
//!
//! ```text
//! User → connector → POST /api/messages → mpsc → Bridge ─→ Assistant v2
//!                                                  ↓            ↓
//! User ←── connector ←── BotConnector ←──── text replies ←──────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod assistant;
pub mod bridge;
pub mod connector;
pub mod message;
pub mod routes;
pub mod sanitize;
pub mod session;
pub mod token;
pub mod traits;

// Re-export commonly used types
pub use assistant::{AssistantBackend, AssistantClient, AssistantError, AssistantResult};
pub use bridge::{Bridge, RelayError};
pub use connector::BotConnector;
pub use message::{Activity, ActivityType, ChannelMessage, ConversationReference};
pub use routes::{build_router, create_state, ChannelsState};
pub use sanitize::{sanitize, SanitizedText};
pub use session::{
    open_store, DocumentSessionStore, MemorySessionStore, SessionResolver, SessionStore,
    SqliteSessionStore, StoreError,
};
pub use traits::{ChannelError, ChannelResult, ChatConnector};

use anyhow::Context;
use axum::http::StatusCode;
use relay_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Largest accepted activity body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Wire the store, assistant client and connector into a bridge.
pub fn build_bridge(config: &Config) -> anyhow::Result<Arc<Bridge>> {
    let timeout = Duration::from_secs(config.network.request_timeout_secs);

    let store = open_store(&config.storage, timeout).context("Failed to open session store")?;

    if config.assistant.assistant_id.is_empty() {
        tracing::warn!("ASSISTANT_ID is not set; assistant calls will fail");
    }
    let backend: Arc<dyn AssistantBackend> = Arc::new(
        AssistantClient::new(&config.assistant, timeout)
            .context("Failed to create assistant client")?,
    );

    if !config.connector.has_credentials() {
        tracing::warn!("appId is not set; replies are sent without authentication");
    }
    let connector: Arc<dyn ChatConnector> = Arc::new(
        BotConnector::new(&config.connector, timeout).context("Failed to create connector")?,
    );

    let resolver = SessionResolver::new(store, backend.clone());
    Ok(Arc::new(Bridge::new(resolver, backend, connector)))
}

/// Build the relay router with request limits, plus the processor queue.
pub fn build_relay_router(
    config: &Config,
) -> (axum::Router, tokio::sync::mpsc::Receiver<ChannelMessage>) {
    let (state, rx) = create_state();
    let router = with_request_limits(
        build_router(state),
        Duration::from_secs(config.network.request_timeout_secs),
    );

    (router, rx)
}

/// Apply the request timeout (408) and body size limit (413).
fn with_request_limits(router: axum::Router, timeout: Duration) -> axum::Router {
    router
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// Start the relay HTTP server and run until interrupted.
///
/// On shutdown the server stops accepting activities first; messages already
/// queued or in flight are then given the request timeout to finish.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config
            .network
            .bind
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("Invalid bind address '{}'", config.network.bind))?,
        config.network.port,
    ));

    let bridge = build_bridge(config)?;
    let (router, rx) = build_relay_router(config);

    let processor_handle = Bridge::spawn_processor(bridge, rx);

    tracing::info!("Starting Relay Channels on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // The router holds the queue sender; once serving ends it is dropped and
    // the processor drains what is left.
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let grace = Duration::from_secs(config.network.request_timeout_secs);
    match tokio::time::timeout(grace, processor_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Relay processor failed"),
        Err(_) => tracing::warn!("In-flight messages did not finish within {:?}", grace),
    }
    tracing::info!("Relay Channels stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    fn limited_router() -> axum::Router {
        let router = axum::Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "done"
                }),
            )
            .route("/echo", post(|body: String| async move { body }));
        with_request_limits(router, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let response = limited_router()
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let response = limited_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header("content-length", MAX_BODY_BYTES + 1)
                    .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_small_body_accepted() {
        let response = limited_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from("hi"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
