//! Session bindings: storage backends and the resolver.

pub mod document;
pub mod resolver;
pub mod sqlite;
pub mod store;

pub use document::DocumentSessionStore;
pub use resolver::SessionResolver;
pub use sqlite::SqliteSessionStore;
pub use store::{MemorySessionStore, SessionStore, StoreError, StoreResult};

use relay_common::config::{StorageConfig, StorageKind};
use std::sync::Arc;
use std::time::Duration;

/// Build the session store selected by the storage URL.
pub fn open_store(config: &StorageConfig, timeout: Duration) -> StoreResult<Arc<dyn SessionStore>> {
    let kind = config
        .kind()
        .map_err(|e| StoreError::Config(e.to_string()))?;

    let store: Arc<dyn SessionStore> = match kind {
        StorageKind::Memory => Arc::new(MemorySessionStore::new()),
        StorageKind::Sqlite(path) => Arc::new(SqliteSessionStore::new(&path)?),
        StorageKind::Document(endpoint) => Arc::new(DocumentSessionStore::new(
            endpoint,
            &config.key,
            config.database.clone(),
            config.collection.clone(),
            timeout,
        )?),
    };

    tracing::info!(backend = store.name(), "Session store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(url: &str, key: &str) -> StorageConfig {
        StorageConfig {
            url: url.into(),
            key: key.into(),
            database: "botdocs".into(),
            collection: "botdata".into(),
        }
    }

    #[test]
    fn test_open_memory_store() {
        let store = open_store(&storage("memory:", "unused"), Duration::from_secs(1)).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_open_sqlite_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("s.db").display());
        let store = open_store(&storage(&url, "unused"), Duration::from_secs(1)).unwrap();
        assert_eq!(store.name(), "sqlite");
    }

    #[test]
    fn test_open_document_store() {
        let store = open_store(
            &storage("https://example.documents.azure.com:443/", "a2V5"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(store.name(), "document");
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = open_store(&storage("ftp://host/", "k"), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
