use crate::domain::models::{PendingAction, Progress, Task};
use crate::infrastructure::error::EngineError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use tokio::sync::watch;

/// Write batch applied in one transaction when reconciling remote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRemoteOp {
    Upsert(Task),
    HardDeleteLocal(String),
    HardDeleteServer(i64),
}

pub trait TaskStore: Send + Sync {
    /// Live tasks for the owner, most recently touched first.
    fn active(&self, owner_id: i64) -> Result<Vec<Task>, EngineError>;

    /// Live tasks whose title, detail or tag contains `keyword`.
    fn search(&self, owner_id: i64, keyword: &str) -> Result<Vec<Task>, EngineError>;

    /// Live tasks with a due time inside `[start, end)`.
    fn due_between(&self, owner_id: i64, start: i64, end: i64) -> Result<Vec<Task>, EngineError>;

    /// Live tasks not yet done.
    fn count_open(&self, owner_id: i64) -> Result<i64, EngineError>;

    /// Records with an unconfirmed local mutation, oldest mutation first.
    fn pending(&self, owner_id: i64) -> Result<Vec<Task>, EngineError>;

    fn find_by_local_id(&self, local_id: &str) -> Result<Option<Task>, EngineError>;

    fn find_by_server_id(&self, owner_id: i64, server_id: i64)
    -> Result<Option<Task>, EngineError>;

    fn upsert(&self, task: &Task) -> Result<(), EngineError>;

    fn hard_delete(&self, local_id: &str) -> Result<(), EngineError>;

    /// Applies a reconciliation batch atomically. Either every op lands or
    /// none does, so a failed sync cannot leave records half-updated.
    fn apply_remote(&self, ops: &[TaskRemoteOp]) -> Result<(), EngineError>;

    /// Change feed. The value is a version counter; observers re-query on
    /// every bump rather than receiving record payloads.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

pub struct SqliteTaskStore {
    db_path: PathBuf,
    changes: watch::Sender<u64>,
}

impl SqliteTaskStore {
    pub fn new(db_path: PathBuf) -> Self {
        let (changes, _) = watch::channel(0);
        Self { db_path, changes }
    }

    fn open(&self) -> Result<Connection, EngineError> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn from_row(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
        Ok(Task {
            local_id: row.get("local_id")?,
            owner_id: row.get("owner_id")?,
            server_id: row.get("server_id")?,
            title: row.get("title")?,
            detail: row.get("detail")?,
            due_time: row.get("due_time")?,
            tag: row.get("tag")?,
            quadrant: row.get("quadrant")?,
            progress: Progress::from_code(row.get("progress")?),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            deleted_at: row.get("deleted_at")?,
            pending_action: PendingAction::from_code(row.get("pending_action")?),
            local_mutation_clock: row.get("local_mutation_clock")?,
        })
    }

    fn query(
        conn: &Connection,
        sql: &str,
        bind: impl rusqlite::Params,
    ) -> Result<Vec<Task>, EngineError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(bind, Self::from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    fn upsert_in(conn: &Connection, task: &Task) -> Result<(), EngineError> {
        conn.execute(
            "INSERT INTO tasks (local_id, owner_id, server_id, title, detail, due_time,
                                tag, quadrant, progress, created_at, updated_at, deleted_at,
                                pending_action, local_mutation_clock)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT (local_id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 server_id = excluded.server_id,
                 title = excluded.title,
                 detail = excluded.detail,
                 due_time = excluded.due_time,
                 tag = excluded.tag,
                 quadrant = excluded.quadrant,
                 progress = excluded.progress,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at,
                 deleted_at = excluded.deleted_at,
                 pending_action = excluded.pending_action,
                 local_mutation_clock = excluded.local_mutation_clock",
            params![
                task.local_id,
                task.owner_id,
                task.server_id,
                task.title,
                task.detail,
                task.due_time,
                task.tag,
                task.quadrant,
                task.progress.code(),
                task.created_at,
                task.updated_at,
                task.deleted_at,
                task.pending_action.code(),
                task.local_mutation_clock,
            ],
        )?;
        Ok(())
    }
}

const LIVE: &str = "deleted_at IS NULL AND pending_action <> 3";

impl TaskStore for SqliteTaskStore {
    fn active(&self, owner_id: i64) -> Result<Vec<Task>, EngineError> {
        let conn = self.open()?;
        Self::query(
            &conn,
            &format!(
                "SELECT * FROM tasks WHERE owner_id = ?1 AND {LIVE}
                 ORDER BY local_mutation_clock DESC"
            ),
            params![owner_id],
        )
    }

    fn search(&self, owner_id: i64, keyword: &str) -> Result<Vec<Task>, EngineError> {
        let conn = self.open()?;
        let pattern = format!("%{keyword}%");
        Self::query(
            &conn,
            &format!(
                "SELECT * FROM tasks WHERE owner_id = ?1 AND {LIVE}
                 AND (title LIKE ?2 OR detail LIKE ?2 OR tag LIKE ?2)
                 ORDER BY local_mutation_clock DESC"
            ),
            params![owner_id, pattern],
        )
    }

    fn due_between(&self, owner_id: i64, start: i64, end: i64) -> Result<Vec<Task>, EngineError> {
        let conn = self.open()?;
        Self::query(
            &conn,
            &format!(
                "SELECT * FROM tasks WHERE owner_id = ?1 AND {LIVE}
                 AND due_time >= ?2 AND due_time < ?3
                 ORDER BY due_time ASC, local_mutation_clock DESC"
            ),
            params![owner_id, start, end],
        )
    }

    fn count_open(&self, owner_id: i64) -> Result<i64, EngineError> {
        let conn = self.open()?;
        let count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM tasks WHERE owner_id = ?1 AND {LIVE} AND progress <> 2"
            ),
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn pending(&self, owner_id: i64) -> Result<Vec<Task>, EngineError> {
        let conn = self.open()?;
        Self::query(
            &conn,
            "SELECT * FROM tasks WHERE owner_id = ?1 AND pending_action <> 0
             ORDER BY local_mutation_clock ASC",
            params![owner_id],
        )
    }

    fn find_by_local_id(&self, local_id: &str) -> Result<Option<Task>, EngineError> {
        let conn = self.open()?;
        let task = conn
            .query_row(
                "SELECT * FROM tasks WHERE local_id = ?1",
                params![local_id],
                Self::from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn find_by_server_id(
        &self,
        owner_id: i64,
        server_id: i64,
    ) -> Result<Option<Task>, EngineError> {
        let conn = self.open()?;
        let task = conn
            .query_row(
                "SELECT * FROM tasks WHERE owner_id = ?1 AND server_id = ?2",
                params![owner_id, server_id],
                Self::from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn upsert(&self, task: &Task) -> Result<(), EngineError> {
        let conn = self.open()?;
        Self::upsert_in(&conn, task)?;
        self.notify();
        Ok(())
    }

    fn hard_delete(&self, local_id: &str) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute("DELETE FROM tasks WHERE local_id = ?1", params![local_id])?;
        self.notify();
        Ok(())
    }

    fn apply_remote(&self, ops: &[TaskRemoteOp]) -> Result<(), EngineError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        for op in ops {
            match op {
                TaskRemoteOp::Upsert(task) => Self::upsert_in(&tx, task)?,
                TaskRemoteOp::HardDeleteLocal(local_id) => {
                    tx.execute("DELETE FROM tasks WHERE local_id = ?1", params![local_id])?;
                }
                TaskRemoteOp::HardDeleteServer(server_id) => {
                    tx.execute("DELETE FROM tasks WHERE server_id = ?1", params![server_id])?;
                }
            }
        }
        tx.commit()?;
        self.notify();
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
