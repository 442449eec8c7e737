use crate::infrastructure::error::EngineError;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Watermark handed to the first pull of a fresh install.
pub const INITIAL_WATERMARK: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Tasks,
    Schedule,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Tasks => "tasks",
            RecordKind::Schedule => "schedule",
        }
    }
}

/// Per-owner, per-kind pull watermarks. The stored value is the server's own
/// response time, opaque to the client.
pub trait WatermarkStore: Send + Sync {
    fn load(&self, owner_id: i64, kind: RecordKind) -> Result<Option<String>, EngineError>;

    fn save(
        &self,
        owner_id: i64,
        kind: RecordKind,
        watermark: &str,
        saved_at: i64,
    ) -> Result<(), EngineError>;
}

pub struct SqliteWatermarkStore {
    db_path: PathBuf,
}

impl SqliteWatermarkStore {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

impl WatermarkStore for SqliteWatermarkStore {
    fn load(&self, owner_id: i64, kind: RecordKind) -> Result<Option<String>, EngineError> {
        let conn = Connection::open(&self.db_path)?;
        let watermark = conn
            .query_row(
                "SELECT watermark FROM sync_state WHERE owner_id = ?1 AND kind = ?2",
                params![owner_id, kind.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(watermark)
    }

    fn save(
        &self,
        owner_id: i64,
        kind: RecordKind,
        watermark: &str,
        saved_at: i64,
    ) -> Result<(), EngineError> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO sync_state (owner_id, kind, watermark, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (owner_id, kind) DO UPDATE
             SET watermark = excluded.watermark, saved_at = excluded.saved_at",
            params![owner_id, kind.as_str(), watermark, saved_at],
        )?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWatermarkStore {
    entries: Mutex<HashMap<(i64, RecordKind), String>>,
}

impl WatermarkStore for InMemoryWatermarkStore {
    fn load(&self, owner_id: i64, kind: RecordKind) -> Result<Option<String>, EngineError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| EngineError::Credential("watermark store poisoned".into()))?
            .get(&(owner_id, kind))
            .cloned())
    }

    fn save(
        &self,
        owner_id: i64,
        kind: RecordKind,
        watermark: &str,
        _saved_at: i64,
    ) -> Result<(), EngineError> {
        self.entries
            .lock()
            .map_err(|_| EngineError::Credential("watermark store poisoned".into()))?
            .insert((owner_id, kind), watermark.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;

    #[test]
    fn sqlite_store_upserts_per_owner_and_kind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("plansync.db");
        initialize_database(&db_path).expect("init");

        let store = SqliteWatermarkStore::new(db_path);
        assert_eq!(store.load(7, RecordKind::Tasks).expect("load"), None);

        store
            .save(7, RecordKind::Tasks, "2026-01-01T00:00:00Z", 100)
            .expect("save");
        store
            .save(7, RecordKind::Schedule, "2026-02-01T00:00:00Z", 100)
            .expect("save");
        store
            .save(7, RecordKind::Tasks, "2026-03-01T00:00:00Z", 200)
            .expect("save");

        assert_eq!(
            store.load(7, RecordKind::Tasks).expect("load").as_deref(),
            Some("2026-03-01T00:00:00Z")
        );
        assert_eq!(
            store.load(7, RecordKind::Schedule).expect("load").as_deref(),
            Some("2026-02-01T00:00:00Z")
        );
        assert_eq!(store.load(8, RecordKind::Tasks).expect("load"), None);
    }
}
