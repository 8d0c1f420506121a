//! Single-row snapshot persistence over an embedded SQLite database.

use std::path::Path;

use async_trait::async_trait;
use log::debug;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use dayloop_core::store::{PersistedState, SnapshotStore, StoreError};

const SNAPSHOT_KEY: &str = "root";

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Embedded [`SnapshotStore`].
///
/// The whole client snapshot is one JSON document keyed `root`; saves are
/// whole-document replaces, matching the engine's atomic-snapshot contract.
/// A row that exists but cannot be decoded loads as [`StoreError::Corrupt`],
/// which boot treats as empty state.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()))
            .map_err(backend)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS persisted_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM persisted_state WHERE key = ?1",
                [SNAPSHOT_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|err| StoreError::Corrupt(err.to_string())),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(state).map_err(|err| StoreError::Backend(err.to_string()))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO persisted_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![SNAPSHOT_KEY, json],
        )
        .map_err(backend)?;
        debug!("snapshot saved ({} bytes)", json.len());
        Ok(())
    }
}
