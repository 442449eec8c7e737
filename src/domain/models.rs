use crate::domain::time::DAY_MS;
use serde::{Deserialize, Serialize};

pub const QUADRANT_UNCLASSIFIED: i64 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    #[default]
    NotYet,
    InProgress,
    Done,
}

impl Progress {
    pub const fn code(self) -> i64 {
        match self {
            Self::NotYet => 0,
            Self::InProgress => 1,
            Self::Done => 2,
        }
    }

    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::InProgress,
            2 => Self::Done,
            _ => Self::NotYet,
        }
    }
}

/// Local mutation not yet confirmed by the remote service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    #[default]
    None,
    Create,
    Update,
    Delete,
}

impl PendingAction {
    pub const fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Create => 1,
            Self::Update => 2,
            Self::Delete => 3,
        }
    }

    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Create,
            2 => Self::Update,
            3 => Self::Delete,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSyncState {
    #[default]
    Synced,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

impl SlotSyncState {
    pub const fn code(self) -> i64 {
        match self {
            Self::Synced => 0,
            Self::PendingCreate => 1,
            Self::PendingUpdate => 2,
            Self::PendingDelete => 3,
        }
    }

    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::PendingCreate,
            2 => Self::PendingUpdate,
            3 => Self::PendingDelete,
            _ => Self::Synced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Client-generated UUID; primary identity, stable across sync.
    pub local_id: String,
    pub owner_id: i64,
    /// Remote id, populated after the first confirmed create push.
    pub server_id: Option<i64>,
    pub title: String,
    pub detail: String,
    pub due_time: Option<i64>,
    pub tag: String,
    /// 0-3 classified, 4 unclassified.
    pub quadrant: i64,
    pub progress: Progress,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub pending_action: PendingAction,
    /// Monotonic local timestamp used for push ordering and UI sort.
    pub local_mutation_clock: i64,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("task.title must not be empty".to_string());
        }
        if !(0..=QUADRANT_UNCLASSIFIED).contains(&self.quadrant) {
            return Err("task.quadrant must be between 0 and 4".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    /// Local auto-increment key; 0 means not yet inserted.
    pub slot_id: i64,
    pub owner_id: i64,
    /// Midnight of the slot's calendar day.
    pub day_anchor: i64,
    pub start_time: i64,
    pub end_time: i64,
    /// References `Task.local_id`; cleared when the task is deleted.
    pub linked_task_id: Option<String>,
    pub custom_title: Option<String>,
    pub note: Option<String>,
    pub server_slot_id: Option<i64>,
    pub sync_state: SlotSyncState,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl ScheduleSlot {
    pub fn is_task_linked(&self) -> bool {
        self.linked_task_id.is_some()
    }

    /// Checks a slot whose `day_anchor` has already been normalized to the
    /// midnight of `start_time`'s day.
    pub fn validate(&self) -> Result<(), String> {
        if self.end_time <= self.start_time {
            return Err("slot.end_time must be after slot.start_time".to_string());
        }
        if self.start_time < self.day_anchor || self.end_time > self.day_anchor + DAY_MS {
            return Err("slot must not cross a day boundary".to_string());
        }
        if self.linked_task_id.is_none() {
            let title = self.custom_title.as_deref().unwrap_or("").trim();
            if title.is_empty() {
                return Err("slot.custom_title is required when no task is linked".to_string());
            }
        }
        Ok(())
    }
}

/// A slot joined with the linked task's title and quadrant (LEFT JOIN view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWithTask {
    pub slot: ScheduleSlot,
    pub task_title: Option<String>,
    pub task_quadrant: Option<i64>,
}
