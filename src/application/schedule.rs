use crate::application::NowProvider;
use crate::domain::models::{ScheduleSlot, SlotSyncState, SlotWithTask};
use crate::domain::time::{DAY_MS, HOUR_MS, MINUTE_MS, align_up, day_anchor};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::schedule_store::{AnalysisFilter, ScheduleStore, SlotRemoteOp};
use std::sync::Arc;
use tokio::sync::watch;

/// Planning window scanned by the free-hour suggestion.
const PLAN_WINDOW_START_HOUR: i64 = 8;
const PLAN_WINDOW_END_HOUR: i64 = 22;

/// Result of a save attempt. A conflict is a normal outcome carrying the
/// earliest blocking slot, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(ScheduleSlot),
    Conflict(ScheduleSlot),
}

pub struct ScheduleService<S, C> {
    schedule: Arc<S>,
    credentials: Arc<C>,
    now: NowProvider,
}

impl<S, C> ScheduleService<S, C>
where
    S: ScheduleStore,
    C: CredentialStore,
{
    pub fn new(schedule: Arc<S>, credentials: Arc<C>, now: NowProvider) -> Self {
        Self {
            schedule,
            credentials,
            now,
        }
    }

    fn owner(&self) -> Result<i64, EngineError> {
        self.credentials
            .load_session()?
            .map(|session| session.owner_id)
            .ok_or(EngineError::NotAuthenticated)
    }

    /// Validates and persists a slot. The day anchor is recomputed from the
    /// start time before any range check, and the conflict probe never sees
    /// the slot itself on an edit.
    pub fn save_slot(&self, mut slot: ScheduleSlot) -> Result<SaveOutcome, EngineError> {
        let owner_id = self.owner()?;
        slot.owner_id = owner_id;
        slot.day_anchor = day_anchor(slot.start_time);
        slot.validate().map_err(EngineError::Validation)?;

        let exclude = if slot.slot_id == 0 { -1 } else { slot.slot_id };
        if let Some(blocking) = self.schedule.find_first_conflict(
            owner_id,
            slot.day_anchor,
            slot.start_time,
            slot.end_time,
            exclude,
        )? {
            return Ok(SaveOutcome::Conflict(blocking));
        }

        let now = (self.now)();
        slot.updated_at = now;
        slot.deleted_at = None;
        slot.sync_state = if slot.slot_id == 0 || slot.server_slot_id.is_none() {
            SlotSyncState::PendingCreate
        } else {
            SlotSyncState::PendingUpdate
        };

        if slot.slot_id == 0 {
            slot.created_at = now;
            slot.slot_id = self.schedule.insert(&slot)?;
        } else {
            self.schedule.update(&slot)?;
        }
        Ok(SaveOutcome::Saved(slot))
    }

    /// Tombstones a slot. A slot the server has seen is flagged for a delete
    /// push; one it never saw is tombstoned with nothing left to send.
    pub fn delete_slot(&self, slot_id: i64) -> Result<(), EngineError> {
        self.owner()?;
        let Some(slot) = self.schedule.find_by_slot_id(slot_id)? else {
            return Ok(());
        };
        let now = (self.now)();
        if slot.server_slot_id.is_some() {
            self.schedule.soft_delete(slot_id, now)
        } else {
            self.schedule.apply_remote(&[SlotRemoteOp::SoftDelete {
                slot_id,
                deleted_at: now,
                updated_at: now,
            }])
        }
    }

    pub fn day_view(&self, at: i64) -> Result<Vec<SlotWithTask>, EngineError> {
        let owner_id = self.owner()?;
        self.schedule.slots_with_task_for_day(owner_id, day_anchor(at))
    }

    /// Scans the planning window for the first whole free hour. After each
    /// busy slot the cursor snaps up to the next step boundary; a cursor past
    /// 22:00 ends the scan, but a gap starting at or before 22:00 may run
    /// into the evening as long as a whole hour remains before midnight.
    pub fn first_free_hour(
        &self,
        at: i64,
        step_minutes: i64,
    ) -> Result<Option<(i64, i64)>, EngineError> {
        let owner_id = self.owner()?;
        let day = day_anchor(at);
        let window_end = day + PLAN_WINDOW_END_HOUR * HOUR_MS;
        let step = step_minutes.max(1) * MINUTE_MS;

        let mut cursor = day + PLAN_WINDOW_START_HOUR * HOUR_MS;
        for slot in self.schedule.slots_for_day(owner_id, day)? {
            if slot.end_time <= cursor {
                continue;
            }
            if slot.start_time - cursor >= HOUR_MS {
                return Ok(Some((cursor, cursor + HOUR_MS)));
            }
            cursor = day + align_up(slot.end_time - day, step);
            if cursor > window_end {
                return Ok(None);
            }
        }
        if (day + DAY_MS) - cursor >= HOUR_MS {
            return Ok(Some((cursor, cursor + HOUR_MS)));
        }
        Ok(None)
    }

    /// Slots feeding the time-use analysis. Deselecting both linkage kinds
    /// means no filter; a blank keyword means no keyword.
    pub fn analysis_slots(
        &self,
        start: i64,
        end: i64,
        keyword: &str,
        include_task: bool,
        include_free: bool,
    ) -> Result<Vec<ScheduleSlot>, EngineError> {
        let owner_id = self.owner()?;
        let (include_task, include_free) = if !include_task && !include_free {
            (true, true)
        } else {
            (include_task, include_free)
        };
        let keyword = keyword.trim();
        self.schedule.query_for_analysis(
            owner_id,
            &AnalysisFilter {
                start_day: day_anchor(start),
                end_day: day_anchor(end),
                keyword: (!keyword.is_empty()).then(|| keyword.to_string()),
                include_task,
                include_free,
            },
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.schedule.subscribe()
    }
}
