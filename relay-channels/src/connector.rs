//! Bot Framework connector client.
//!
//! Replies are posted to the conversation's `serviceUrl` as message activities.
//! When an app id is configured, each request carries a bearer token obtained
//! with the OAuth client-credentials grant; without one (local emulator) no
//! authorization header is sent. The token only goes to trusted `serviceUrl`
//! hosts; replies to any other host are sent without it.

use crate::message::{Activity, ConversationReference};
use crate::token::{CachedToken, TokenCache};
use crate::traits::{ChannelError, ChannelResult, ChatConnector};
use async_trait::async_trait;
use relay_common::config::ConnectorConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Response to a posted activity.
#[derive(Debug, Default, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    id: String,
}

/// Chat connector speaking the Bot Framework REST API.
pub struct BotConnector {
    client: reqwest::Client,
    config: ConnectorConfig,
    tokens: TokenCache,
}

impl BotConnector {
    pub fn new(config: &ConnectorConfig, timeout: Duration) -> ChannelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
            tokens: TokenCache::new(),
        })
    }

    /// Bearer token for a reply to `url`, or `None` in emulator mode or when
    /// the host is not trusted.
    async fn access_token(&self, url: &url::Url) -> ChannelResult<Option<String>> {
        if !self.config.has_credentials() {
            return Ok(None);
        }
        if !self.config.is_trusted_service_url(url) {
            tracing::warn!(
                host = url.host_str().unwrap_or_default(),
                "serviceUrl host is not trusted; sending reply without credentials"
            );
            return Ok(None);
        }
        self.tokens.get_or_fetch(|| self.fetch_token()).await.map(Some)
    }

    async fn fetch_token(&self) -> ChannelResult<CachedToken> {
        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.app_id.as_str()),
                ("client_secret", self.config.app_password.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!(
                "Connector token request failed ({status}): {text}"
            )));
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::Auth(format!("Invalid token response: {e}")))?;

        tracing::debug!("Connector access token refreshed, expires in {} seconds", data.expires_in);
        Ok(CachedToken::new(data.access_token, data.expires_in))
    }

    /// `{serviceUrl}/v3/conversations/{conversation}/activities[/{replyTo}]`
    fn activities_url(reference: &ConversationReference) -> ChannelResult<url::Url> {
        let mut url = url::Url::parse(&reference.service_url).map_err(|e| {
            ChannelError::InvalidMessage(format!("invalid serviceUrl '{}': {e}", reference.service_url))
        })?;

        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ChannelError::InvalidMessage(format!("invalid serviceUrl '{}'", reference.service_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["v3", "conversations", reference.conversation.id.as_str(), "activities"]);
            if let Some(activity_id) = &reference.activity_id {
                segments.push(activity_id);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl ChatConnector for BotConnector {
    fn name(&self) -> &'static str {
        "botframework"
    }

    async fn send_text(&self, reference: &ConversationReference, text: &str) -> ChannelResult<String> {
        let url = Self::activities_url(reference)?;
        let activity = Activity::reply(reference, text);

        let token = self.access_token(&url).await?;
        let mut request = self.client.post(url).json(&activity);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "Connector reply failed ({status}): {text}"
            )));
        }

        let body = resp.text().await.unwrap_or_default();
        let id = serde_json::from_str::<ResourceResponse>(&body)
            .map(|r| r.id)
            .unwrap_or_default();

        tracing::debug!(
            conversation_id = %reference.conversation.id,
            activity_id = %id,
            "Reply sent"
        );
        Ok(id)
    }
}
