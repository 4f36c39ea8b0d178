//! Configuration for the relay services.
//!
//! Everything is sourced from the process environment, with an optional
//! `.env` file loaded first. Variable names match the ones the bot has always
//! been deployed with.
//!
//! # Environment Variable Mapping
//!
//! ## Storage (mandatory)
//! - `storageURL` → storage.url (`memory:`, `sqlite:<path>`, `https://<account>.documents.azure.com:443/`)
//! - `storageKey` → storage.key
//! - `STORAGE_DATABASE` / `STORAGE_COLLECTION` → storage.database / storage.collection
//!
//! ## Network
//! - `port` or `PORT` → network.port
//! - `BIND_ADDRESS` → network.bind
//! - `REQUEST_TIMEOUT_SECS` → network.request_timeout_secs
//!
//! ## Assistant
//! - `SERVICE_URL` (or `ASSISTANT_URL`) → assistant.service_url
//! - `ASSISTANT_ID`, `ASSISTANT_VERSION`
//! - `ASSISTANT_AUTH_TYPE`, `ASSISTANT_APIKEY`, `ASSISTANT_AUTH_URL`,
//!   `ASSISTANT_USERNAME`, `ASSISTANT_PASSWORD`, `ASSISTANT_BEARER_TOKEN`
//!
//! ## Chat connector
//! - `appId`, `appPassword`, `CONNECTOR_TOKEN_URL`, `CONNECTOR_SCOPE`
//! - `TRUSTED_SERVICE_URLS` → connector.trusted_service_hosts (comma-separated hosts or URLs)
//!
//! ## Observability
//! - `LOG_LEVEL`, `LOG_FORMAT`

use crate::error::{Error, Result, ResultExt};
use crate::util::mask_secret;
use std::path::PathBuf;
use std::str::FromStr;

/// Default listening port of the bot endpoint.
pub const DEFAULT_PORT: u16 = 3978;

/// Default assistant endpoint.
pub const DEFAULT_SERVICE_URL: &str = "https://gateway.watsonplatform.net/assistant/api/";

/// Assistant API version date sent with every request.
pub const DEFAULT_ASSISTANT_VERSION: &str = "2020-04-01";

/// IAM token endpoint used for API-key authentication.
pub const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";

/// OAuth endpoint for chat connector app credentials.
pub const DEFAULT_CONNECTOR_TOKEN_URL: &str =
    "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";

/// OAuth scope for chat connector app credentials.
pub const DEFAULT_CONNECTOR_SCOPE: &str = "https://api.botframework.com/.default";

// ============================================================================
// Sections
// ============================================================================

/// Listening socket and outbound HTTP settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub bind: String,
    pub port: u16,
    /// Timeout applied to every outbound HTTP call (assistant, connector, storage).
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            request_timeout_secs: 30,
        }
    }
}

/// Session store location and credentials.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub key: String,
    pub database: String,
    pub collection: String,
}

/// Which session store backend a storage URL selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    /// Process-local map; bindings are lost on restart.
    Memory,
    /// SQLite file at the given path.
    Sqlite(PathBuf),
    /// Document database reached over HTTPS.
    Document(url::Url),
}

impl StorageConfig {
    /// Resolve the backend selected by `url`.
    pub fn kind(&self) -> Result<StorageKind> {
        let url = self.url.trim();
        if url == "memory:" || url == "memory://" {
            return Ok(StorageKind::Memory);
        }
        if let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) {
            if path.is_empty() {
                return Err(Error::Config("sqlite storage URL has no path".into()));
            }
            return Ok(StorageKind::Sqlite(PathBuf::from(path)));
        }

        let parsed = url::Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid storageURL '{url}': {e}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(StorageKind::Document(parsed)),
            other => Err(Error::Config(format!("unsupported storage scheme '{other}'"))),
        }
    }
}

/// How requests to the assistant are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// API key exchanged for an IAM bearer token.
    Iam,
    /// HTTP basic auth.
    Basic,
    /// Static bearer token.
    BearerToken,
    NoAuth,
}

impl FromStr for AuthType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "iam" => Ok(Self::Iam),
            "basic" => Ok(Self::Basic),
            "bearertoken" | "bearer_token" | "bearer" => Ok(Self::BearerToken),
            "noauth" | "none" => Ok(Self::NoAuth),
            other => Err(Error::Config(format!("unknown ASSISTANT_AUTH_TYPE '{other}'"))),
        }
    }
}

/// Assistant credentials.
#[derive(Debug, Clone)]
pub struct AssistantAuthConfig {
    pub auth_type: AuthType,
    pub apikey: Option<String>,
    pub auth_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
}

/// Conversational-AI backend settings.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub service_url: String,
    /// Fixed assistant identifier sent with every request.
    pub assistant_id: String,
    pub version: String,
    pub auth: AssistantAuthConfig,
}

/// Reply endpoints that may receive the connector token. A host matches an
/// entry when it equals it or is a subdomain of it.
pub const DEFAULT_TRUSTED_SERVICE_HOSTS: &[&str] = &[
    "botframework.com",
    "botframework.azure.us",
    "smba.trafficmanager.net",
    "smba.infra.gov.teams.microsoft.us",
];

/// Chat connector (bot application) credentials.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub app_id: String,
    pub app_password: String,
    pub token_url: String,
    pub scope: String,
    /// Hosts whose `serviceUrl` is sent the bearer token. Lowercase.
    pub trusted_service_hosts: Vec<String>,
}

impl ConnectorConfig {
    /// Without an app id replies go out unauthenticated (local emulator).
    pub fn has_credentials(&self) -> bool {
        !self.app_id.is_empty()
    }

    /// Whether replies to `service_url` may carry the connector token.
    pub fn is_trusted_service_url(&self, service_url: &url::Url) -> bool {
        let Some(host) = service_url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.trusted_service_hosts.iter().any(|trusted| {
            host == *trusted
                || host
                    .strip_suffix(trusted.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Parse a comma-separated list of hosts or URLs into lowercase hosts.
fn parse_trusted_hosts(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match url::Url::parse(entry) {
            Ok(url) if url.has_host() => url.host_str().map(str::to_string),
            _ => Some(entry.trim_start_matches("*.").trim_end_matches('/').to_string()),
        })
        .map(|host| host.to_ascii_lowercase())
        .collect()
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// "pretty" or "json"
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "pretty".into(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure for the relay.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub assistant: AssistantConfig,
    pub connector: ConnectorConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(e.to_string()).with_context("Failed to read .env")),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage_key = get("storageKey").ok_or_else(|| Error::ConfigMissing("storageKey".into()))?;
        let storage_url = get("storageURL").ok_or_else(|| Error::ConfigMissing("storageURL".into()))?;

        let mut network = NetworkConfig::default();
        if let Some(port) = get("port").or_else(|| get("PORT")) {
            network.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid port '{port}'")))?;
        }
        if let Some(bind) = get("BIND_ADDRESS") {
            network.bind = bind;
        }
        if let Some(timeout) = get("REQUEST_TIMEOUT_SECS") {
            network.request_timeout_secs = timeout
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid REQUEST_TIMEOUT_SECS '{timeout}'")))?;
        }

        let storage = StorageConfig {
            url: storage_url,
            key: storage_key,
            database: get("STORAGE_DATABASE").unwrap_or_else(|| "botdocs".into()),
            collection: get("STORAGE_COLLECTION").unwrap_or_else(|| "botdata".into()),
        };

        let apikey = get("ASSISTANT_APIKEY");
        let username = get("ASSISTANT_USERNAME");
        let password = get("ASSISTANT_PASSWORD");
        let bearer_token = get("ASSISTANT_BEARER_TOKEN");
        let auth_type = match get("ASSISTANT_AUTH_TYPE") {
            Some(value) => value
                .parse::<AuthType>()
                .context("Invalid assistant authentication settings")?,
            None if apikey.is_some() => AuthType::Iam,
            None if bearer_token.is_some() => AuthType::BearerToken,
            None if username.is_some() => AuthType::Basic,
            None => AuthType::NoAuth,
        };

        let assistant = AssistantConfig {
            service_url: get("SERVICE_URL")
                .or_else(|| get("ASSISTANT_URL"))
                .unwrap_or_else(|| DEFAULT_SERVICE_URL.into()),
            assistant_id: get("ASSISTANT_ID").unwrap_or_default(),
            version: get("ASSISTANT_VERSION").unwrap_or_else(|| DEFAULT_ASSISTANT_VERSION.into()),
            auth: AssistantAuthConfig {
                auth_type,
                apikey,
                auth_url: get("ASSISTANT_AUTH_URL").unwrap_or_else(|| DEFAULT_IAM_URL.into()),
                username,
                password,
                bearer_token,
            },
        };

        let connector = ConnectorConfig {
            app_id: get("appId").unwrap_or_default(),
            app_password: get("appPassword").unwrap_or_default(),
            token_url: get("CONNECTOR_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_CONNECTOR_TOKEN_URL.into()),
            scope: get("CONNECTOR_SCOPE").unwrap_or_else(|| DEFAULT_CONNECTOR_SCOPE.into()),
            trusted_service_hosts: match get("TRUSTED_SERVICE_URLS") {
                Some(value) => parse_trusted_hosts(&value),
                None => DEFAULT_TRUSTED_SERVICE_HOSTS.iter().map(|h| h.to_string()).collect(),
            },
        };

        let mut observability = ObservabilityConfig::default();
        if let Some(level) = get("LOG_LEVEL") {
            observability.log_level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            observability.log_format = format;
        }

        Ok(Self {
            network,
            storage,
            assistant,
            connector,
            observability,
        })
    }

    /// Socket address string to bind the HTTP server on.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }

    /// Log the effective configuration with every secret masked.
    pub fn log_summary(&self) {
        tracing::info!(
            storage_url = %self.storage.url,
            storage_key = %mask_secret(&self.storage.key),
            service_url = %self.assistant.service_url,
            assistant_id = %self.assistant.assistant_id,
            auth_type = ?self.assistant.auth.auth_type,
            app_id = %self.connector.app_id,
            trusted_service_hosts = ?self.connector.trusted_service_hosts,
            app_password = %mask_secret(&self.connector.app_password),
            listen = %self.listen_address(),
            "Configuration loaded"
        );
    }
}
