//! HTTP client for the Assistant v2 API.

use super::auth::Authenticator;
use super::types::{ApiErrorBody, CreateSessionResponse, MessageRequest, MessageResponse};
use super::{AssistantBackend, AssistantError, AssistantResult};
use async_trait::async_trait;
use relay_common::config::AssistantConfig;
use std::time::Duration;

/// Header carrying the backend's transaction id, logged for support cases.
const TRANSACTION_ID_HEADER: &str = "x-global-transaction-id";

/// Thin adapter over the Assistant v2 REST API.
#[derive(Debug)]
pub struct AssistantClient {
    /// HTTP client for API calls
    client: reqwest::Client,
    /// Base URL, without trailing slash
    service_url: String,
    assistant_id: String,
    version: String,
    auth: Authenticator,
}

impl AssistantClient {
    /// Create a client from configuration.
    pub fn new(config: &AssistantConfig, timeout: Duration) -> AssistantResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AssistantError::Http(e.to_string()))?;

        let auth = Authenticator::from_config(&config.auth, client.clone())?;

        Ok(Self {
            client,
            service_url: config.service_url.trim_end_matches('/').to_string(),
            assistant_id: config.assistant_id.clone(),
            version: config.version.clone(),
            auth,
        })
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    fn sessions_url(&self) -> String {
        format!("{}/v2/assistants/{}/sessions", self.service_url, self.assistant_id)
    }

    fn message_url(&self, session_id: &str) -> String {
        format!("{}/{}/message", self.sessions_url(), session_id)
    }

    /// Send an authenticated POST and decode a successful JSON body.
    async fn post<B, T>(&self, url: &str, body: &B) -> AssistantResult<T>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let request = self
            .client
            .post(url)
            .query(&[("version", self.version.as_str())])
            .json(body);
        let request = self.auth.authenticate(request).await?;

        let response = request.send().await?;
        let status = response.status();

        if let Some(transaction_id) = response
            .headers()
            .get(TRANSACTION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            tracing::debug!(transaction_id = %transaction_id, status = %status, "Assistant response");
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error) = serde_json::from_str::<ApiErrorBody>(&error_text) {
                return Err(AssistantError::Api {
                    status: status.as_u16(),
                    message: error.error,
                });
            }

            return Err(AssistantError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| AssistantError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AssistantBackend for AssistantClient {
    async fn create_session(&self) -> AssistantResult<CreateSessionResponse> {
        let url = self.sessions_url();
        tracing::debug!(endpoint = %url, "Creating assistant session");

        self.post(&url, &serde_json::json!({})).await
    }

    async fn message(&self, session_id: &str, text: &str) -> AssistantResult<MessageResponse> {
        let url = self.message_url(session_id);
        tracing::debug!(endpoint = %url, session_id = %session_id, "Sending message to assistant");

        let response: MessageResponse = self.post(&url, &MessageRequest::text(text)).await?;

        if let Ok(dump) = serde_json::to_string_pretty(&response) {
            tracing::debug!(session_id = %session_id, "Response:\n{}", dump);
        }

        Ok(response)
    }
}
