//! Document database session store (Cosmos DB SQL API over REST).
//!
//! Each binding is one document in `dbs/{database}/colls/{collection}`, keyed
//! by the conversation id. Requests are signed with the account master key.

use super::store::{SessionStore, StoreError, StoreResult};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2018-12-31";

/// Characters not allowed in a document id, escaped as `*` + hex code.
const BAD_KEY_CHARS: [char; 8] = ['\\', '?', '/', '#', '\t', '\n', '\r', '*'];

/// Stored document shape.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDocument {
    id: String,
    /// Unescaped conversation id
    real_id: String,
    session_id: String,
    #[serde(default)]
    updated_at: Option<String>,
}

/// Escape a conversation id into a valid document id.
pub fn document_id(conversation_id: &str) -> String {
    let mut id = String::with_capacity(conversation_id.len());
    for c in conversation_id.chars() {
        if BAD_KEY_CHARS.contains(&c) {
            id.push_str(&format!("*{:x}", c as u32));
        } else {
            id.push(c);
        }
    }
    id
}

/// Compute the master-key `authorization` header value for one request.
pub fn master_key_signature(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> StoreResult<String> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::Config(format!("HMAC error: {e}")))?;
    mac.update(payload.as_bytes());
    let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let token = format!("type=master&ver=1.0&sig={sig}");
    Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
}

/// Session store backed by a document database collection.
pub struct DocumentSessionStore {
    client: reqwest::Client,
    endpoint: url::Url,
    database: String,
    collection: String,
    master_key: Vec<u8>,
}

impl std::fmt::Debug for DocumentSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSessionStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("database", &self.database)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl DocumentSessionStore {
    /// Create a store for `endpoint`. `master_key` is the base64 account key.
    pub fn new(
        endpoint: url::Url,
        master_key: &str,
        database: impl Into<String>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let master_key = base64::engine::general_purpose::STANDARD
            .decode(master_key.trim())
            .map_err(|e| StoreError::Config(format!("storageKey is not valid base64: {e}")))?;

        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "storageURL '{endpoint}' is not a base URL"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            database: database.into(),
            collection: collection.into(),
            master_key,
        })
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.collection)
    }

    fn document_link(&self, doc_id: &str) -> String {
        format!("{}/docs/{}", self.collection_link(), doc_id)
    }

    /// Build the request URL for a resource path, percent-encoding each segment.
    fn url_for(&self, segments: &[&str]) -> StoreResult<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Config("storageURL is not a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a signed request for a resource of `resource_type` ("dbs", "colls", "docs").
    fn request(
        &self,
        method: reqwest::Method,
        url: url::Url,
        resource_type: &str,
        resource_link: &str,
    ) -> StoreResult<reqwest::RequestBuilder> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let auth = master_key_signature(
            &self.master_key,
            method.as_str(),
            resource_type,
            resource_link,
            &date,
        )?;

        Ok(self
            .client
            .request(method, url)
            .header("authorization", auth)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    /// Create the database and the collection if they do not exist yet.
    ///
    /// The collection is partitioned on `/id`. A 409 means the resource
    /// already exists.
    async fn ensure_collection(&self) -> StoreResult<()> {
        tracing::info!(
            database = %self.database,
            collection = %self.collection,
            "Creating session collection"
        );

        let url = self.url_for(&["dbs"])?;
        let response = self
            .request(reqwest::Method::POST, url, "dbs", "")?
            .json(&serde_json::json!({ "id": self.database }))
            .send()
            .await?;
        Self::created_or_exists(response, "database").await?;

        let database_link = format!("dbs/{}", self.database);
        let url = self.url_for(&["dbs", self.database.as_str(), "colls"])?;
        let response = self
            .request(reqwest::Method::POST, url, "colls", &database_link)?
            .json(&serde_json::json!({
                "id": self.collection,
                "partitionKey": { "paths": ["/id"], "kind": "Hash" }
            }))
            .send()
            .await?;
        Self::created_or_exists(response, "collection").await
    }

    async fn created_or_exists(response: reqwest::Response, what: &str) -> StoreResult<()> {
        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message: format!("could not create {what}: {message}"),
        })
    }

    /// Upsert one binding document.
    async fn upsert(&self, document: &SessionDocument) -> StoreResult<reqwest::Response> {
        let url = self.url_for(&["dbs", self.database.as_str(), "colls", self.collection.as_str(), "docs"])?;

        Ok(self
            .request(reqwest::Method::POST, url, "docs", &self.collection_link())?
            .header("x-ms-documentdb-is-upsert", "True")
            .header("x-ms-documentdb-partitionkey", Self::partition_key(&document.id))
            .json(document)
            .send()
            .await?)
    }

    fn partition_key(doc_id: &str) -> String {
        serde_json::json!([doc_id]).to_string()
    }

    async fn error_from(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::Api { status, message }
    }
}

#[async_trait]
impl SessionStore for DocumentSessionStore {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn get(&self, conversation_id: &str) -> StoreResult<Option<String>> {
        let doc_id = document_id(conversation_id);
        let url = self.url_for(&[
            "dbs",
            self.database.as_str(),
            "colls",
            self.collection.as_str(),
            "docs",
            doc_id.as_str(),
        ])?;

        let response = self
            .request(reqwest::Method::GET, url, "docs", &self.document_link(&doc_id))?
            .header("x-ms-documentdb-partitionkey", Self::partition_key(&doc_id))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let doc: SessionDocument = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Backend(format!("malformed session document: {e}")))?;
                Ok(Some(doc.session_id))
            }
            _ => Err(Self::error_from(response).await),
        }
    }

    async fn set(&self, conversation_id: &str, session_id: &str) -> StoreResult<()> {
        let document = SessionDocument {
            id: document_id(conversation_id),
            real_id: conversation_id.to_string(),
            session_id: session_id.to_string(),
            updated_at: Some(Utc::now().to_rfc3339()),
        };

        let mut response = self.upsert(&document).await?;

        // 404 on an upsert means the database or collection is missing.
        if response.status() == StatusCode::NOT_FOUND {
            self.ensure_collection().await?;
            response = self.upsert(&document).await?;
        }

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<()> {
        let doc_id = document_id(conversation_id);
        let url = self.url_for(&[
            "dbs",
            self.database.as_str(),
            "colls",
            self.collection.as_str(),
            "docs",
            doc_id.as_str(),
        ])?;

        let response = self
            .request(reqwest::Method::DELETE, url, "docs", &self.document_link(&doc_id))?
            .header("x-ms-documentdb-partitionkey", Self::partition_key(&doc_id))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::error_from(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // base64("test-master-key")
    const KEY: &str = "dGVzdC1tYXN0ZXIta2V5";

    fn store(server: &MockServer) -> DocumentSessionStore {
        let endpoint = url::Url::parse(&format!("{}/", server.uri())).unwrap();
        DocumentSessionStore::new(endpoint, KEY, "botdocs", "botdata", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_document_id_escaping() {
        assert_eq!(document_id("19:abc@thread.skype"), "19:abc@thread.skype");
        assert_eq!(document_id("a/b?c#d"), "a*2fb*3fc*23d");
        assert_eq!(document_id("x*y\\z"), "x*2ay*5cz");
    }

    #[test]
    fn test_signature_format() {
        let sig = master_key_signature(
            b"secret",
            "GET",
            "docs",
            "dbs/botdocs/colls/botdata/docs/c1",
            "Tue, 01 Jan 2030 00:00:00 GMT",
        )
        .unwrap();

        let decoded: String = url::form_urlencoded::parse(format!("auth={sig}").as_bytes())
            .map(|(_, v)| v.into_owned())
            .collect();
        let raw_sig = decoded.strip_prefix("type=master&ver=1.0&sig=").unwrap();
        assert_eq!(
            base64::engine::general_purpose::STANDARD.decode(raw_sig).unwrap().len(),
            32
        );
    }

    #[test]
    fn test_signature_depends_on_verb_and_link() {
        let date = "Tue, 01 Jan 2030 00:00:00 GMT";
        let get = master_key_signature(b"k", "GET", "docs", "dbs/a/colls/b/docs/c", date).unwrap();
        let del = master_key_signature(b"k", "DELETE", "docs", "dbs/a/colls/b/docs/c", date).unwrap();
        let other = master_key_signature(b"k", "GET", "docs", "dbs/a/colls/b/docs/d", date).unwrap();
        assert_ne!(get, del);
        assert_ne!(get, other);
        assert_eq!(
            get,
            master_key_signature(b"k", "get", "DOCS", "dbs/a/colls/b/docs/c", date).unwrap()
        );
    }

    #[test]
    fn test_invalid_key_rejected() {
        let endpoint = url::Url::parse("https://example.documents.azure.com/").unwrap();
        let err = DocumentSessionStore::new(endpoint, "not base64!!", "db", "coll", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dbs/botdocs/colls/botdata/docs/conv-1"))
            .and(header_exists("authorization"))
            .and(header_exists("x-ms-date"))
            .and(header("x-ms-version", API_VERSION))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(store(&server).get("conv-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_existing_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dbs/botdocs/colls/botdata/docs/conv-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "conv-1",
                "realId": "conv-1",
                "sessionId": "sess-1",
                "_etag": "\"0000\""
            })))
            .mount(&server)
            .await;

        assert_eq!(
            store(&server).get("conv-1").await.unwrap().as_deref(),
            Some("sess-1")
        );
    }

    #[tokio::test]
    async fn test_set_upserts_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs/botdocs/colls/botdata/docs"))
            .and(header("x-ms-documentdb-is-upsert", "True"))
            .and(header("x-ms-documentdb-partitionkey", "[\"a*2fb\"]"))
            .and(body_partial_json(json!({
                "id": "a*2fb",
                "realId": "a/b",
                "sessionId": "sess-9"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).set("a/b", "sess-9").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_creates_missing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs/botdocs/colls/botdata/docs"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Resource Not Found"))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dbs"))
            .and(body_partial_json(json!({ "id": "botdocs" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dbs/botdocs/colls"))
            .and(body_partial_json(json!({
                "id": "botdata",
                "partitionKey": { "paths": ["/id"] }
            })))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dbs/botdocs/colls/botdata/docs"))
            .and(body_partial_json(json!({ "id": "conv-1", "sessionId": "sess-1" })))
            .respond_with(ResponseTemplate::new(201))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        store(&server).set("conv-1", "sess-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_collection_creation_failure_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dbs/botdocs/colls/botdata/docs"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dbs"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let err = store(&server).set("conv-1", "sess-1").await.unwrap_err();
        assert!(
            matches!(err, StoreError::Api { status: 403, ref message } if message.contains("database"))
        );
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).delete("conv-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad signature"))
            .mount(&server)
            .await;

        let err = store(&server).get("conv-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 401, .. }));
    }
}
