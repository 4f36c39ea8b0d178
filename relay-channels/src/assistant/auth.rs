//! Request authentication for the assistant API.

use super::{AssistantError, AssistantResult};
use crate::token::{CachedToken, TokenCache};
use relay_common::config::{AssistantAuthConfig, AuthType};
use serde::Deserialize;

const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Applies credentials to outgoing assistant requests.
pub enum Authenticator {
    NoAuth,
    Basic { username: String, password: String },
    Bearer(String),
    Iam(IamTokenManager),
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::NoAuth => "noauth",
            Self::Basic { .. } => "basic",
            Self::Bearer(_) => "bearertoken",
            Self::Iam(_) => "iam",
        };
        f.debug_tuple("Authenticator").field(&kind).finish()
    }
}

impl Authenticator {
    /// Build the authenticator selected by configuration.
    pub fn from_config(config: &AssistantAuthConfig, client: reqwest::Client) -> AssistantResult<Self> {
        let missing = |field: &str| AssistantError::Auth(format!("{field} is required"));

        Ok(match config.auth_type {
            AuthType::NoAuth => Self::NoAuth,
            AuthType::Basic => Self::Basic {
                username: config.username.clone().ok_or_else(|| missing("ASSISTANT_USERNAME"))?,
                password: config.password.clone().ok_or_else(|| missing("ASSISTANT_PASSWORD"))?,
            },
            AuthType::BearerToken => Self::Bearer(
                config
                    .bearer_token
                    .clone()
                    .ok_or_else(|| missing("ASSISTANT_BEARER_TOKEN"))?,
            ),
            AuthType::Iam => Self::Iam(IamTokenManager::new(
                client,
                config.auth_url.clone(),
                config.apikey.clone().ok_or_else(|| missing("ASSISTANT_APIKEY"))?,
            )),
        })
    }

    /// Attach credentials to a request.
    pub async fn authenticate(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AssistantResult<reqwest::RequestBuilder> {
        Ok(match self {
            Self::NoAuth => request,
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Bearer(token) => request.bearer_auth(token),
            Self::Iam(manager) => request.bearer_auth(manager.token().await?),
        })
    }

    /// Forget any cached token so the next request fetches a new one.
    pub async fn invalidate(&self) {
        if let Self::Iam(manager) = self {
            manager.cache.invalidate().await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Exchanges an API key for short-lived IAM bearer tokens.
pub struct IamTokenManager {
    client: reqwest::Client,
    url: String,
    apikey: String,
    cache: TokenCache,
}

impl IamTokenManager {
    pub fn new(client: reqwest::Client, url: String, apikey: String) -> Self {
        Self {
            client,
            url,
            apikey,
            cache: TokenCache::new(),
        }
    }

    /// Current access token, refreshed when needed.
    pub async fn token(&self) -> AssistantResult<String> {
        self.cache.get_or_fetch(|| self.fetch()).await
    }

    async fn fetch(&self) -> AssistantResult<CachedToken> {
        tracing::debug!(url = %self.url, "Requesting IAM token");

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", IAM_GRANT_TYPE), ("apikey", self.apikey.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Auth(format!(
                "IAM token request returned {status}: {body}"
            )));
        }

        let token: IamTokenResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Auth(format!("invalid IAM token response: {e}")))?;

        tracing::debug!(expires_in = token.expires_in, "IAM token acquired");
        Ok(CachedToken::new(token.access_token, token.expires_in))
    }
}
