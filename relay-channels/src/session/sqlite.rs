//! `SQLite`-backed session store.

use super::store::{SessionStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// `SQLite` session store.
///
/// One row per conversation: `conversation_id → session_id`.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `db_path`.
    pub fn new(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_bindings (
                conversation_id TEXT PRIMARY KEY,
                session_id      TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("Lock error: {e}")))
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, conversation_id: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let session_id = conn
            .query_row(
                "SELECT session_id FROM session_bindings WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(session_id)
    }

    async fn set(&self, conversation_id: &str, session_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO session_bindings (conversation_id, session_id, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(conversation_id) DO UPDATE
             SET session_id = excluded.session_id, updated_at = excluded.updated_at",
            params![conversation_id, session_id, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM session_bindings WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }
}
