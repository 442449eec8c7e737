use crate::application::NowProvider;
use crate::application::task_sync::SyncOutcome;
use crate::domain::models::SlotSyncState;
use crate::infrastructure::credential_store::{CredentialStore, Session};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::schedule_store::{ScheduleStore, SlotRemoteOp};
use crate::infrastructure::sync_client::SyncApi;
use crate::infrastructure::time_codec::WireTimeCodec;
use crate::infrastructure::watermark_store::{INITIAL_WATERMARK, RecordKind, WatermarkStore};
use crate::infrastructure::wire::{SlotPushRequest, decode_slot, encode_slot_push};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Push/pull cycle for schedule slots. Unlike tasks, remote deletes never
/// remove rows; slots keep a tombstone for day-view history.
pub struct ScheduleSyncEngine<A, S, C, W> {
    api: Arc<A>,
    schedule: Arc<S>,
    credentials: Arc<C>,
    watermarks: Arc<W>,
    codec: WireTimeCodec,
    now: NowProvider,
    cycle: Mutex<()>,
}

impl<A, S, C, W> ScheduleSyncEngine<A, S, C, W>
where
    A: SyncApi,
    S: ScheduleStore,
    C: CredentialStore,
    W: WatermarkStore,
{
    pub fn new(
        api: Arc<A>,
        schedule: Arc<S>,
        credentials: Arc<C>,
        watermarks: Arc<W>,
        codec: WireTimeCodec,
        now: NowProvider,
    ) -> Self {
        Self {
            api,
            schedule,
            credentials,
            watermarks,
            codec,
            now,
            cycle: Mutex::new(()),
        }
    }

    fn session(&self) -> Result<Session, EngineError> {
        self.credentials
            .load_session()?
            .ok_or(EngineError::NotAuthenticated)
    }

    pub async fn sync_once(&self) -> Result<SyncOutcome, EngineError> {
        let _guard = self.cycle.try_lock().map_err(|_| EngineError::SyncBusy)?;
        let session = self.session()?;
        let pushed = self.push_locked(&session).await?;
        let pulled = self.pull_locked(&session).await?;
        Ok(SyncOutcome { pushed, pulled })
    }

    pub async fn push_pending(&self) -> Result<usize, EngineError> {
        let _guard = self.cycle.try_lock().map_err(|_| EngineError::SyncBusy)?;
        let session = self.session()?;
        self.push_locked(&session).await
    }

    pub async fn pull_incremental(&self) -> Result<usize, EngineError> {
        let _guard = self.cycle.try_lock().map_err(|_| EngineError::SyncBusy)?;
        let session = self.session()?;
        self.pull_locked(&session).await
    }

    async fn push_locked(&self, session: &Session) -> Result<usize, EngineError> {
        let pending = self.schedule.pending(session.owner_id)?;
        if pending.is_empty() {
            return Ok(0);
        }

        let request = SlotPushRequest {
            items: pending
                .iter()
                .map(|slot| encode_slot_push(slot, &self.codec))
                .collect(),
        };
        let response = self.api.push_slots(&session.auth_token, &request).await?;

        let now = (self.now)();
        let mut ops = Vec::new();
        for result in &response.results {
            let Some(record) = pending
                .iter()
                .find(|slot| slot.slot_id == result.client_slot_id)
            else {
                tracing::warn!(client_slot_id = result.client_slot_id, "push result for unknown slot");
                continue;
            };
            let confirmed_at = self.codec.parse_server_time(&result.updated_time, now);
            if record.sync_state == SlotSyncState::PendingDelete || result.deleted {
                ops.push(SlotRemoteOp::SoftDelete {
                    slot_id: record.slot_id,
                    deleted_at: record.deleted_at.unwrap_or(now),
                    updated_at: confirmed_at,
                });
                continue;
            }
            let mut cleared = record.clone();
            cleared.server_slot_id = result.server_slot_id.or(record.server_slot_id);
            cleared.sync_state = SlotSyncState::Synced;
            cleared.updated_at = confirmed_at;
            ops.push(SlotRemoteOp::Upsert(cleared));
        }

        let pushed = ops.len();
        self.schedule.apply_remote(&ops)?;
        self.watermarks.save(
            session.owner_id,
            RecordKind::Schedule,
            &response.server_time,
            now,
        )?;
        tracing::debug!(pushed, "slot push applied");
        Ok(pushed)
    }

    async fn pull_locked(&self, session: &Session) -> Result<usize, EngineError> {
        let since = self
            .watermarks
            .load(session.owner_id, RecordKind::Schedule)?
            .unwrap_or_else(|| INITIAL_WATERMARK.to_string());
        let response = self.api.pull_slots(&session.auth_token, &since).await?;

        let now = (self.now)();
        let mut ops = Vec::new();
        for dto in &response.items {
            let existing = self
                .schedule
                .find_by_server_slot_id(session.owner_id, dto.server_slot_id)?;
            // Unpushed local changes outrank anything the pull brings back.
            if existing
                .as_ref()
                .is_some_and(|slot| slot.sync_state != SlotSyncState::Synced)
            {
                continue;
            }
            if let Some(raw) = dto.deleted_time.as_deref() {
                if let Some(existing) = existing.filter(|slot| slot.deleted_at.is_none()) {
                    ops.push(SlotRemoteOp::SoftDelete {
                        slot_id: existing.slot_id,
                        deleted_at: self.codec.parse_server_time(raw, now),
                        updated_at: self.codec.parse_server_time(&dto.updated_time, now),
                    });
                }
                continue;
            }
            let merged = decode_slot(dto, existing.as_ref(), &self.codec, now);
            if existing.as_ref() == Some(&merged) {
                continue;
            }
            ops.push(SlotRemoteOp::Upsert(merged));
        }

        let pulled = ops.len();
        self.schedule.apply_remote(&ops)?;
        self.watermarks.save(
            session.owner_id,
            RecordKind::Schedule,
            &response.server_time,
            now,
        )?;
        tracing::debug!(pulled, watermark = %response.server_time, "slot pull applied");
        Ok(pulled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ScheduleSlot;
    use crate::domain::time::{DAY_MS, HOUR_MS};
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::schedule_store::SqliteScheduleStore;
    use crate::infrastructure::storage::initialize_database;
    use crate::infrastructure::wire::{
        SlotDto, SlotPullResponse, SlotPushResponse, SlotPushResult, TaskPullResponse,
        TaskPushRequest, TaskPushResponse,
    };
    use crate::infrastructure::watermark_store::InMemoryWatermarkStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        push_responses: StdMutex<VecDeque<Result<SlotPushResponse, EngineError>>>,
        pull_responses: StdMutex<VecDeque<Result<SlotPullResponse, EngineError>>>,
        pull_calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncApi for FakeApi {
        async fn push_tasks(
            &self,
            _token: &str,
            _request: &TaskPushRequest,
        ) -> Result<TaskPushResponse, EngineError> {
            Err(EngineError::Remote("not a task fake".into()))
        }

        async fn pull_tasks(
            &self,
            _token: &str,
            _since: &str,
        ) -> Result<TaskPullResponse, EngineError> {
            Err(EngineError::Remote("not a task fake".into()))
        }

        async fn push_slots(
            &self,
            _token: &str,
            _request: &SlotPushRequest,
        ) -> Result<SlotPushResponse, EngineError> {
            self.push_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::Remote("no scripted push".into())))
        }

        async fn pull_slots(
            &self,
            _token: &str,
            _since: &str,
        ) -> Result<SlotPullResponse, EngineError> {
            self.pull_calls.fetch_add(1, Ordering::SeqCst);
            self.pull_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::Remote("no scripted pull".into())))
        }
    }

    type Engine = ScheduleSyncEngine<
        FakeApi,
        SqliteScheduleStore,
        InMemoryCredentialStore,
        InMemoryWatermarkStore,
    >;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("plansync.db");
        initialize_database(&db_path).expect("init");
        let engine = ScheduleSyncEngine::new(
            Arc::new(FakeApi::default()),
            Arc::new(SqliteScheduleStore::new(db_path)),
            Arc::new(InMemoryCredentialStore::with_session(Session {
                owner_id: 7,
                auth_token: "tok".to_string(),
                display_name: "Ada".to_string(),
            })),
            Arc::new(InMemoryWatermarkStore::default()),
            WireTimeCodec::default(),
            Arc::new(|| 50_000),
        );
        (dir, engine)
    }

    fn pending_create(day: i64) -> ScheduleSlot {
        ScheduleSlot {
            slot_id: 0,
            owner_id: 7,
            day_anchor: day,
            start_time: day + 9 * HOUR_MS,
            end_time: day + 10 * HOUR_MS,
            linked_task_id: None,
            custom_title: Some("Gym".to_string()),
            note: None,
            server_slot_id: None,
            sync_state: SlotSyncState::PendingCreate,
            created_at: 1_000,
            updated_at: 1_000,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn confirmed_create_clears_flag_and_stores_server_id() {
        let (_dir, engine) = engine();
        let slot_id = engine.schedule.insert(&pending_create(10 * DAY_MS)).expect("seed");

        engine.api.push_responses.lock().unwrap().push_back(Ok(SlotPushResponse {
            server_time: "1970-01-02 00:00:01.000".to_string(),
            results: vec![SlotPushResult {
                client_slot_id: slot_id,
                server_slot_id: Some(99),
                updated_time: "1970-01-02 00:00:00.000".to_string(),
                deleted: false,
            }],
        }));

        assert_eq!(engine.push_pending().await.expect("push"), 1);
        let row = engine.schedule.find_by_slot_id(slot_id).expect("find").expect("row");
        assert_eq!(row.server_slot_id, Some(99));
        assert_eq!(row.sync_state, SlotSyncState::Synced);
        assert_eq!(
            engine.watermarks.load(7, RecordKind::Schedule).expect("load").as_deref(),
            Some("1970-01-02 00:00:01.000")
        );
    }

    #[tokio::test]
    async fn confirmed_delete_keeps_a_tombstone() {
        let (_dir, engine) = engine();
        let mut slot = pending_create(10 * DAY_MS);
        slot.server_slot_id = Some(99);
        slot.sync_state = SlotSyncState::PendingDelete;
        slot.deleted_at = Some(2_000);
        let slot_id = engine.schedule.insert(&slot).expect("seed");

        engine.api.push_responses.lock().unwrap().push_back(Ok(SlotPushResponse {
            server_time: "1970-01-02 00:00:01.000".to_string(),
            results: vec![SlotPushResult {
                client_slot_id: slot_id,
                server_slot_id: Some(99),
                updated_time: "1970-01-02 00:00:00.000".to_string(),
                deleted: true,
            }],
        }));

        assert_eq!(engine.push_pending().await.expect("push"), 1);
        let row = engine.schedule.find_by_slot_id(slot_id).expect("find").expect("row");
        assert_eq!(row.deleted_at, Some(2_000));
        assert_eq!(row.sync_state, SlotSyncState::Synced);
        assert!(engine.schedule.slots_for_day(7, 10 * DAY_MS).expect("day").is_empty());
    }

    #[tokio::test]
    async fn remote_delete_tombstones_instead_of_removing() {
        let (_dir, engine) = engine();
        let mut slot = pending_create(10 * DAY_MS);
        slot.server_slot_id = Some(99);
        slot.sync_state = SlotSyncState::Synced;
        let slot_id = engine.schedule.insert(&slot).expect("seed");

        engine.api.pull_responses.lock().unwrap().push_back(Ok(SlotPullResponse {
            server_time: "1970-01-03 00:00:00.000".to_string(),
            items: vec![SlotDto {
                server_slot_id: 99,
                owner_id: 7,
                date_millis: 0,
                start_time_millis: 0,
                end_time_millis: 0,
                local_task_id: None,
                custom_title: None,
                note: None,
                updated_time: "1970-01-02 12:00:00.000".to_string(),
                deleted_time: Some("1970-01-02 12:00:00.000".to_string()),
            }],
        }));

        assert_eq!(engine.pull_incremental().await.expect("pull"), 1);
        let row = engine.schedule.find_by_slot_id(slot_id).expect("find").expect("row");
        assert!(row.deleted_at.is_some());
    }

    #[tokio::test]
    async fn redelivered_pull_applies_nothing() {
        let (_dir, engine) = engine();
        let codec = WireTimeCodec::default();
        let day = 10 * DAY_MS;
        let payload = SlotPullResponse {
            server_time: "1970-01-03 00:00:00.000".to_string(),
            items: vec![SlotDto {
                server_slot_id: 99,
                owner_id: 7,
                date_millis: codec.to_wire_millis(day),
                start_time_millis: codec.to_wire_millis(day + 9 * HOUR_MS),
                end_time_millis: codec.to_wire_millis(day + 10 * HOUR_MS),
                local_task_id: None,
                custom_title: Some("Gym".to_string()),
                note: None,
                updated_time: "1970-01-02 12:00:00.000".to_string(),
                deleted_time: None,
            }],
        };
        engine.api.pull_responses.lock().unwrap().push_back(Ok(payload.clone()));
        engine.api.pull_responses.lock().unwrap().push_back(Ok(payload));

        assert_eq!(engine.pull_incremental().await.expect("pull"), 1);
        assert_eq!(engine.pull_incremental().await.expect("pull"), 0);
        assert_eq!(engine.schedule.slots_for_day(7, day).expect("day").len(), 1);
    }

    #[tokio::test]
    async fn pull_keeps_slots_with_unpushed_edits() {
        let (_dir, engine) = engine();
        let mut slot = pending_create(10 * DAY_MS);
        slot.server_slot_id = Some(99);
        slot.sync_state = SlotSyncState::PendingUpdate;
        slot.custom_title = Some("local edit".to_string());
        let slot_id = engine.schedule.insert(&slot).expect("seed");

        engine.api.pull_responses.lock().unwrap().push_back(Ok(SlotPullResponse {
            server_time: "1970-01-03 00:00:00.000".to_string(),
            items: vec![SlotDto {
                server_slot_id: 99,
                owner_id: 7,
                date_millis: 0,
                start_time_millis: 0,
                end_time_millis: HOUR_MS,
                local_task_id: None,
                custom_title: Some("stale remote title".to_string()),
                note: None,
                updated_time: "1970-01-02 12:00:00.000".to_string(),
                deleted_time: None,
            }],
        }));

        assert_eq!(engine.pull_incremental().await.expect("pull"), 0);
        let row = engine.schedule.find_by_slot_id(slot_id).expect("find").expect("row");
        assert_eq!(row.custom_title.as_deref(), Some("local edit"));
    }
}
