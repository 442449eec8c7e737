use crate::domain::models::{
    PendingAction, Progress, ScheduleSlot, SlotSyncState, Task,
};
use crate::infrastructure::time_codec::WireTimeCodec;
use serde::{Deserialize, Serialize};

// ---- task wire format (snake_case field names on the wire) ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPushItem {
    pub client_local_id: String,
    #[serde(rename = "server_tid")]
    pub server_id: Option<i64>,
    pub title: String,
    pub detail: String,
    pub due_time: Option<String>,
    pub tag: String,
    pub quadrant: i64,
    pub progress: i64,
    pub updated_time: Option<String>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPushRequest {
    pub items: Vec<TaskPushItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPushResult {
    pub client_local_id: String,
    #[serde(rename = "server_tid")]
    pub server_id: Option<i64>,
    pub updated_time: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPushResponse {
    pub results: Vec<TaskPushResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    #[serde(rename = "tid")]
    pub server_id: i64,
    #[serde(rename = "user_uid")]
    pub owner_id: i64,
    pub title: String,
    pub detail: String,
    pub due_time: Option<String>,
    pub tag: String,
    pub quadrant: i64,
    pub progress: i64,
    #[serde(default)]
    pub created_time: Option<String>,
    pub updated_time: String,
    pub deleted_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPullResponse {
    pub server_time: String,
    pub items: Vec<TaskDto>,
}

// ---- schedule wire format (camelCase field names on the wire) ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlotPushItem {
    /// "create" | "update" | "delete"
    pub op: String,
    pub client_slot_id: i64,
    pub server_slot_id: Option<i64>,
    pub date_millis: i64,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
    pub local_task_id: Option<String>,
    pub custom_title: Option<String>,
    pub note: Option<String>,
    pub updated_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotPushRequest {
    pub items: Vec<SlotPushItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPushResult {
    pub client_slot_id: i64,
    pub server_slot_id: Option<i64>,
    pub updated_time: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPushResponse {
    pub server_time: String,
    pub results: Vec<SlotPushResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDto {
    pub server_slot_id: i64,
    #[serde(rename = "ownerUid")]
    pub owner_id: i64,
    pub date_millis: i64,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
    pub local_task_id: Option<String>,
    pub custom_title: Option<String>,
    pub note: Option<String>,
    pub updated_time: String,
    #[serde(default)]
    pub deleted_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPullResponse {
    pub server_time: String,
    pub items: Vec<SlotDto>,
}

// ---- record <-> wire mapping ----

/// Encode a task for push. Pure function of the record snapshot: the deletion
/// marker is derived from the soft-delete timestamp and the pending flag, not
/// from caller state.
pub fn encode_task_push(task: &Task, codec: &WireTimeCodec) -> TaskPushItem {
    TaskPushItem {
        client_local_id: task.local_id.clone(),
        server_id: task.server_id,
        title: task.title.clone(),
        detail: task.detail.clone(),
        due_time: task.due_time.map(|due| codec.format_due_time(due)),
        tag: task.tag.clone(),
        quadrant: task.quadrant,
        progress: task.progress.code(),
        updated_time: task.updated_at.map(|at| codec.format_server_time(at)),
        is_deleted: task.deleted_at.is_some() || task.pending_action == PendingAction::Delete,
    }
}

/// Merge a pulled task into local shape. When `existing` is present its
/// primary key and local clocks are preserved so UI references stay stable
/// and an unchanged remote item merges to an identical row.
pub fn decode_task(dto: &TaskDto, existing: Option<&Task>, codec: &WireTimeCodec, now: i64) -> Task {
    Task {
        local_id: existing
            .map(|task| task.local_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        owner_id: dto.owner_id,
        server_id: Some(dto.server_id),
        title: dto.title.clone(),
        detail: dto.detail.clone(),
        due_time: dto
            .due_time
            .as_deref()
            .map(|raw| codec.parse_server_time(raw, now)),
        tag: dto.tag.clone(),
        quadrant: dto.quadrant,
        progress: Progress::from_code(dto.progress),
        created_at: dto
            .created_time
            .as_deref()
            .map(|raw| codec.parse_server_time(raw, now))
            .or(existing.and_then(|task| task.created_at)),
        updated_at: Some(codec.parse_server_time(&dto.updated_time, now)),
        deleted_at: dto
            .deleted_time
            .as_deref()
            .map(|raw| codec.parse_server_time(raw, now)),
        pending_action: PendingAction::None,
        local_mutation_clock: existing.map_or(now, |task| task.local_mutation_clock),
    }
}

/// Encode a slot for push; the operation verb derives from the sync flag and
/// schedule clock fields get the fixed wire-offset correction.
pub fn encode_slot_push(slot: &ScheduleSlot, codec: &WireTimeCodec) -> SlotPushItem {
    let op = match slot.sync_state {
        SlotSyncState::PendingCreate => "create",
        SlotSyncState::PendingDelete => "delete",
        SlotSyncState::PendingUpdate | SlotSyncState::Synced => "update",
    };
    SlotPushItem {
        op: op.to_string(),
        client_slot_id: slot.slot_id,
        server_slot_id: slot.server_slot_id,
        date_millis: codec.to_wire_millis(slot.day_anchor),
        start_time_millis: codec.to_wire_millis(slot.start_time),
        end_time_millis: codec.to_wire_millis(slot.end_time),
        local_task_id: slot.linked_task_id.clone(),
        custom_title: slot.custom_title.clone(),
        note: slot.note.clone(),
        updated_time: codec.format_server_time(slot.updated_at),
    }
}

/// Merge a pulled slot into local shape, preserving the local primary key and
/// creation time when the slot is already known.
pub fn decode_slot(
    dto: &SlotDto,
    existing: Option<&ScheduleSlot>,
    codec: &WireTimeCodec,
    now: i64,
) -> ScheduleSlot {
    ScheduleSlot {
        slot_id: existing.map_or(0, |slot| slot.slot_id),
        owner_id: dto.owner_id,
        day_anchor: codec.from_wire_millis(dto.date_millis),
        start_time: codec.from_wire_millis(dto.start_time_millis),
        end_time: codec.from_wire_millis(dto.end_time_millis),
        linked_task_id: dto.local_task_id.clone(),
        custom_title: dto.custom_title.clone(),
        note: dto.note.clone(),
        server_slot_id: Some(dto.server_slot_id),
        sync_state: SlotSyncState::Synced,
        created_at: existing.map_or(now, |slot| slot.created_at),
        updated_at: codec.parse_server_time(&dto.updated_time, now),
        deleted_at: dto
            .deleted_time
            .as_deref()
            .map(|raw| codec.parse_server_time(raw, now)),
    }
}
