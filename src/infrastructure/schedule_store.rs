use crate::domain::models::{ScheduleSlot, SlotSyncState, SlotWithTask};
use crate::infrastructure::error::EngineError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use tokio::sync::watch;

/// Write batch applied in one transaction when reconciling remote state.
/// Slots are never hard-deleted; remote deletes become tombstones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRemoteOp {
    Upsert(ScheduleSlot),
    SoftDelete {
        slot_id: i64,
        deleted_at: i64,
        updated_at: i64,
    },
}

/// Filter for the time-use analysis query. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFilter {
    pub start_day: i64,
    pub end_day: i64,
    pub keyword: Option<String>,
    pub include_task: bool,
    pub include_free: bool,
}

pub trait ScheduleStore: Send + Sync {
    /// Live slots for one day, ordered by start time.
    fn slots_for_day(&self, owner_id: i64, day_anchor: i64)
    -> Result<Vec<ScheduleSlot>, EngineError>;

    /// Day view joined with linked task title and quadrant.
    fn slots_with_task_for_day(
        &self,
        owner_id: i64,
        day_anchor: i64,
    ) -> Result<Vec<SlotWithTask>, EngineError>;

    /// Live slots in a day range, optionally narrowed by title keyword and
    /// linkage kind, ordered by day then start time.
    fn query_for_analysis(
        &self,
        owner_id: i64,
        filter: &AnalysisFilter,
    ) -> Result<Vec<ScheduleSlot>, EngineError>;

    /// Earliest live slot overlapping `[start, end)` on the day, excluding
    /// `exclude_slot_id`.
    fn find_first_conflict(
        &self,
        owner_id: i64,
        day_anchor: i64,
        start: i64,
        end: i64,
        exclude_slot_id: i64,
    ) -> Result<Option<ScheduleSlot>, EngineError>;

    /// Inserts a new slot and returns its assigned rowid.
    fn insert(&self, slot: &ScheduleSlot) -> Result<i64, EngineError>;

    fn update(&self, slot: &ScheduleSlot) -> Result<(), EngineError>;

    fn soft_delete(&self, slot_id: i64, deleted_at: i64) -> Result<(), EngineError>;

    /// Slots with an unconfirmed local mutation, oldest update first.
    fn pending(&self, owner_id: i64) -> Result<Vec<ScheduleSlot>, EngineError>;

    fn find_by_slot_id(&self, slot_id: i64) -> Result<Option<ScheduleSlot>, EngineError>;

    fn find_by_server_slot_id(
        &self,
        owner_id: i64,
        server_slot_id: i64,
    ) -> Result<Option<ScheduleSlot>, EngineError>;

    /// Clears the task linkage on every slot referencing `local_task_id`.
    /// Slots with a blank custom title inherit `task_title` so they stay
    /// renderable, and each touched slot is flagged for push.
    fn detach_task(
        &self,
        owner_id: i64,
        local_task_id: &str,
        task_title: &str,
        now: i64,
    ) -> Result<(), EngineError>;

    /// Applies a reconciliation batch atomically.
    fn apply_remote(&self, ops: &[SlotRemoteOp]) -> Result<(), EngineError>;

    /// Change feed; version counter, observers re-query.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

pub struct SqliteScheduleStore {
    db_path: PathBuf,
    changes: watch::Sender<u64>,
}

impl SqliteScheduleStore {
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

    fn from_row(row: &Row<'_>) -> Result<ScheduleSlot, rusqlite::Error> {
        Ok(ScheduleSlot {
            slot_id: row.get("slot_id")?,
            owner_id: row.get("owner_id")?,
            day_anchor: row.get("day_anchor")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            linked_task_id: row.get("linked_task_id")?,
            custom_title: row.get("custom_title")?,
            note: row.get("note")?,
            server_slot_id: row.get("server_slot_id")?,
            sync_state: SlotSyncState::from_code(row.get("sync_state")?),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            deleted_at: row.get("deleted_at")?,
        })
    }

    fn query(
        conn: &Connection,
        sql: &str,
        bind: impl rusqlite::Params,
    ) -> Result<Vec<ScheduleSlot>, EngineError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(bind, Self::from_row)?;
        let mut slots = Vec::new();
        for row in rows {
            slots.push(row?);
        }
        Ok(slots)
    }

    // Writes resolve the task linkage through a subquery: a pulled slot may
    // reference a task id that does not exist locally yet, and such a slot
    // degrades to unlinked instead of tripping the foreign key.
    fn update_in(conn: &Connection, slot: &ScheduleSlot) -> Result<(), EngineError> {
        conn.execute(
            "UPDATE schedule_slots SET
                 owner_id = ?2, day_anchor = ?3, start_time = ?4, end_time = ?5,
                 linked_task_id = (SELECT local_id FROM tasks WHERE local_id = ?6),
                 custom_title = ?7, note = ?8, server_slot_id = ?9,
                 sync_state = ?10, created_at = ?11, updated_at = ?12, deleted_at = ?13
             WHERE slot_id = ?1",
            params![
                slot.slot_id,
                slot.owner_id,
                slot.day_anchor,
                slot.start_time,
                slot.end_time,
                slot.linked_task_id,
                slot.custom_title,
                slot.note,
                slot.server_slot_id,
                slot.sync_state.code(),
                slot.created_at,
                slot.updated_at,
                slot.deleted_at,
            ],
        )?;
        Ok(())
    }

    fn insert_in(conn: &Connection, slot: &ScheduleSlot) -> Result<i64, EngineError> {
        conn.execute(
            "INSERT INTO schedule_slots
                 (owner_id, day_anchor, start_time, end_time, linked_task_id, custom_title,
                  note, server_slot_id, sync_state, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4,
                     (SELECT local_id FROM tasks WHERE local_id = ?5),
                     ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                slot.owner_id,
                slot.day_anchor,
                slot.start_time,
                slot.end_time,
                slot.linked_task_id,
                slot.custom_title,
                slot.note,
                slot.server_slot_id,
                slot.sync_state.code(),
                slot.created_at,
                slot.updated_at,
                slot.deleted_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

const LIVE: &str = "deleted_at IS NULL AND sync_state <> 3";

impl ScheduleStore for SqliteScheduleStore {
    fn slots_for_day(
        &self,
        owner_id: i64,
        day_anchor: i64,
    ) -> Result<Vec<ScheduleSlot>, EngineError> {
        let conn = self.open()?;
        Self::query(
            &conn,
            &format!(
                "SELECT * FROM schedule_slots
                 WHERE owner_id = ?1 AND day_anchor = ?2 AND {LIVE}
                 ORDER BY start_time ASC"
            ),
            params![owner_id, day_anchor],
        )
    }

    fn slots_with_task_for_day(
        &self,
        owner_id: i64,
        day_anchor: i64,
    ) -> Result<Vec<SlotWithTask>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT s.*, t.title AS task_title, t.quadrant AS task_quadrant
             FROM schedule_slots s
             LEFT JOIN tasks t ON t.local_id = s.linked_task_id
             WHERE s.owner_id = ?1 AND s.day_anchor = ?2
               AND s.deleted_at IS NULL AND s.sync_state <> 3
             ORDER BY s.start_time ASC"
        )?;
        let rows = stmt.query_map(params![owner_id, day_anchor], |row| {
            Ok(SlotWithTask {
                slot: Self::from_row(row)?,
                task_title: row.get("task_title")?,
                task_quadrant: row.get("task_quadrant")?,
            })
        })?;
        let mut views = Vec::new();
        for row in rows {
            views.push(row?);
        }
        Ok(views)
    }

    fn query_for_analysis(
        &self,
        owner_id: i64,
        filter: &AnalysisFilter,
    ) -> Result<Vec<ScheduleSlot>, EngineError> {
        let conn = self.open()?;
        Self::query(
            &conn,
            "SELECT s.* FROM schedule_slots s
             LEFT JOIN tasks t ON t.local_id = s.linked_task_id
             WHERE s.owner_id = ?1
               AND s.day_anchor >= ?2 AND s.day_anchor <= ?3
               AND s.deleted_at IS NULL AND s.sync_state <> 3
               AND (?4 IS NULL
                    OR s.custom_title LIKE '%' || ?4 || '%'
                    OR t.title LIKE '%' || ?4 || '%'
                    OR t.detail LIKE '%' || ?4 || '%')
               AND ((?5 AND s.linked_task_id IS NOT NULL)
                    OR (?6 AND s.linked_task_id IS NULL))
             ORDER BY s.day_anchor ASC, s.start_time ASC",
            params![
                owner_id,
                filter.start_day,
                filter.end_day,
                filter.keyword,
                filter.include_task,
                filter.include_free,
            ],
        )
    }

    fn find_first_conflict(
        &self,
        owner_id: i64,
        day_anchor: i64,
        start: i64,
        end: i64,
        exclude_slot_id: i64,
    ) -> Result<Option<ScheduleSlot>, EngineError> {
        let conn = self.open()?;
        // Half-open overlap: existing.start < end AND start < existing.end.
        let slot = conn
            .query_row(
                &format!(
                    "SELECT * FROM schedule_slots
                     WHERE owner_id = ?1 AND day_anchor = ?2 AND {LIVE}
                       AND slot_id <> ?3 AND start_time < ?5 AND ?4 < end_time
                     ORDER BY start_time ASC LIMIT 1"
                ),
                params![owner_id, day_anchor, exclude_slot_id, start, end],
                Self::from_row,
            )
            .optional()?;
        Ok(slot)
    }

    fn insert(&self, slot: &ScheduleSlot) -> Result<i64, EngineError> {
        let conn = self.open()?;
        let slot_id = Self::insert_in(&conn, slot)?;
        self.notify();
        Ok(slot_id)
    }

    fn update(&self, slot: &ScheduleSlot) -> Result<(), EngineError> {
        let conn = self.open()?;
        Self::update_in(&conn, slot)?;
        self.notify();
        Ok(())
    }

    fn soft_delete(&self, slot_id: i64, deleted_at: i64) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE schedule_slots
             SET deleted_at = ?2, updated_at = ?2, sync_state = ?3
             WHERE slot_id = ?1",
            params![slot_id, deleted_at, SlotSyncState::PendingDelete.code()],
        )?;
        self.notify();
        Ok(())
    }

    fn pending(&self, owner_id: i64) -> Result<Vec<ScheduleSlot>, EngineError> {
        let conn = self.open()?;
        Self::query(
            &conn,
            "SELECT * FROM schedule_slots
             WHERE owner_id = ?1 AND sync_state <> 0
             ORDER BY updated_at ASC",
            params![owner_id],
        )
    }

    fn find_by_slot_id(&self, slot_id: i64) -> Result<Option<ScheduleSlot>, EngineError> {
        let conn = self.open()?;
        let slot = conn
            .query_row(
                "SELECT * FROM schedule_slots WHERE slot_id = ?1",
                params![slot_id],
                Self::from_row,
            )
            .optional()?;
        Ok(slot)
    }

    fn find_by_server_slot_id(
        &self,
        owner_id: i64,
        server_slot_id: i64,
    ) -> Result<Option<ScheduleSlot>, EngineError> {
        let conn = self.open()?;
        let slot = conn
            .query_row(
                "SELECT * FROM schedule_slots WHERE owner_id = ?1 AND server_slot_id = ?2",
                params![owner_id, server_slot_id],
                Self::from_row,
            )
            .optional()?;
        Ok(slot)
    }

    fn detach_task(
        &self,
        owner_id: i64,
        local_task_id: &str,
        task_title: &str,
        now: i64,
    ) -> Result<(), EngineError> {
        let conn = self.open()?;
        let touched = conn.execute(
            "UPDATE schedule_slots
             SET linked_task_id = NULL,
                 custom_title = CASE
                     WHEN custom_title IS NULL OR TRIM(custom_title) = '' THEN ?3
                     ELSE custom_title
                 END,
                 updated_at = ?4,
                 sync_state = CASE WHEN sync_state = 0 THEN 2 ELSE sync_state END
             WHERE owner_id = ?1 AND linked_task_id = ?2 AND deleted_at IS NULL",
            params![owner_id, local_task_id, task_title, now],
        )?;
        if touched > 0 {
            self.notify();
        }
        Ok(())
    }

    fn apply_remote(&self, ops: &[SlotRemoteOp]) -> Result<(), EngineError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        for op in ops {
            match op {
                SlotRemoteOp::Upsert(slot) => {
                    if slot.slot_id == 0 {
                        Self::insert_in(&tx, slot)?;
                    } else {
                        Self::update_in(&tx, slot)?;
                    }
                }
                SlotRemoteOp::SoftDelete {
                    slot_id,
                    deleted_at,
                    updated_at,
                } => {
                    tx.execute(
                        "UPDATE schedule_slots
                         SET deleted_at = ?2, updated_at = ?3, sync_state = 0
                         WHERE slot_id = ?1",
                        params![slot_id, deleted_at, updated_at],
                    )?;
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
