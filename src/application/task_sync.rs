use crate::application::NowProvider;
use crate::domain::models::PendingAction;
use crate::infrastructure::credential_store::{CredentialStore, Session};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::sync_client::SyncApi;
use crate::infrastructure::task_store::{TaskRemoteOp, TaskStore};
use crate::infrastructure::time_codec::WireTimeCodec;
use crate::infrastructure::watermark_store::{INITIAL_WATERMARK, RecordKind, WatermarkStore};
use crate::infrastructure::wire::{TaskPushRequest, decode_task, encode_task_push};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Counts reported by a completed sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pushed: usize,
    pub pulled: usize,
}

pub struct TaskSyncEngine<A, T, C, W> {
    api: Arc<A>,
    tasks: Arc<T>,
    credentials: Arc<C>,
    watermarks: Arc<W>,
    codec: WireTimeCodec,
    now: NowProvider,
    cycle: Mutex<()>,
}

impl<A, T, C, W> TaskSyncEngine<A, T, C, W>
where
    A: SyncApi,
    T: TaskStore,
    C: CredentialStore,
    W: WatermarkStore,
{
    pub fn new(
        api: Arc<A>,
        tasks: Arc<T>,
        credentials: Arc<C>,
        watermarks: Arc<W>,
        codec: WireTimeCodec,
        now: NowProvider,
    ) -> Self {
        Self {
            api,
            tasks,
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

    /// One full cycle: confirmed-pending push first, then watermark pull.
    /// A cycle already in flight makes this return `SyncBusy` immediately.
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
        let pending = self.tasks.pending(session.owner_id)?;
        if pending.is_empty() {
            return Ok(0);
        }

        let request = TaskPushRequest {
            items: pending
                .iter()
                .map(|task| encode_task_push(task, &self.codec))
                .collect(),
        };
        let response = self.api.push_tasks(&session.auth_token, &request).await?;

        let now = (self.now)();
        let mut ops = Vec::new();
        for result in &response.results {
            let Some(record) = pending
                .iter()
                .find(|task| task.local_id == result.client_local_id)
            else {
                tracing::warn!(client_local_id = %result.client_local_id, "push result for unknown record");
                continue;
            };
            if record.pending_action == PendingAction::Delete {
                ops.push(match record.server_id {
                    Some(server_id) => TaskRemoteOp::HardDeleteServer(server_id),
                    None => TaskRemoteOp::HardDeleteLocal(record.local_id.clone()),
                });
                continue;
            }
            let mut cleared = record.clone();
            cleared.server_id = result.server_id.or(record.server_id);
            cleared.updated_at = Some(self.codec.parse_server_time(&result.updated_time, now));
            cleared.pending_action = PendingAction::None;
            cleared.local_mutation_clock = now;
            ops.push(TaskRemoteOp::Upsert(cleared));
        }

        let pushed = ops.len();
        self.tasks.apply_remote(&ops)?;
        tracing::debug!(pushed, "task push applied");
        Ok(pushed)
    }

    async fn pull_locked(&self, session: &Session) -> Result<usize, EngineError> {
        let since = self
            .watermarks
            .load(session.owner_id, RecordKind::Tasks)?
            .unwrap_or_else(|| INITIAL_WATERMARK.to_string());
        let response = self.api.pull_tasks(&session.auth_token, &since).await?;

        let now = (self.now)();
        let mut ops = Vec::new();
        for dto in &response.items {
            let existing = self.tasks.find_by_server_id(session.owner_id, dto.server_id)?;
            // Unpushed local changes outrank anything the pull brings back.
            if existing
                .as_ref()
                .is_some_and(|task| task.pending_action != PendingAction::None)
            {
                continue;
            }
            if dto.deleted_time.is_some() {
                if let Some(existing) = existing {
                    ops.push(TaskRemoteOp::HardDeleteLocal(existing.local_id));
                }
                continue;
            }
            let merged = decode_task(dto, existing.as_ref(), &self.codec, now);
            if existing.as_ref() == Some(&merged) {
                continue;
            }
            ops.push(TaskRemoteOp::Upsert(merged));
        }

        let pulled = ops.len();
        self.tasks.apply_remote(&ops)?;
        self.watermarks
            .save(session.owner_id, RecordKind::Tasks, &response.server_time, now)?;
        tracing::debug!(pulled, watermark = %response.server_time, "task pull applied");
        Ok(pulled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Progress, Task};
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::storage::initialize_database;
    use crate::infrastructure::sync_client::SyncApi;
    use crate::infrastructure::task_store::SqliteTaskStore;
    use crate::infrastructure::watermark_store::InMemoryWatermarkStore;
    use crate::infrastructure::wire::{
        SlotPullResponse, SlotPushRequest, SlotPushResponse, TaskDto, TaskPullResponse,
        TaskPushResponse, TaskPushResult,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        push_responses: StdMutex<VecDeque<Result<TaskPushResponse, EngineError>>>,
        pull_responses: StdMutex<VecDeque<Result<TaskPullResponse, EngineError>>>,
        push_calls: AtomicUsize,
        pull_calls: AtomicUsize,
        last_since: StdMutex<Option<String>>,
    }

    impl FakeApi {
        fn queue_push(&self, response: Result<TaskPushResponse, EngineError>) {
            self.push_responses.lock().unwrap().push_back(response);
        }

        fn queue_pull(&self, response: Result<TaskPullResponse, EngineError>) {
            self.pull_responses.lock().unwrap().push_back(response);
        }
    }

    #[async_trait]
    impl SyncApi for FakeApi {
        async fn push_tasks(
            &self,
            _token: &str,
            _request: &TaskPushRequest,
        ) -> Result<TaskPushResponse, EngineError> {
            self.push_calls.fetch_add(1, Ordering::SeqCst);
            self.push_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::Remote("no scripted push".into())))
        }

        async fn pull_tasks(
            &self,
            _token: &str,
            since: &str,
        ) -> Result<TaskPullResponse, EngineError> {
            self.pull_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_since.lock().unwrap() = Some(since.to_string());
            self.pull_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::Remote("no scripted pull".into())))
        }

        async fn push_slots(
            &self,
            _token: &str,
            _request: &SlotPushRequest,
        ) -> Result<SlotPushResponse, EngineError> {
            Err(EngineError::Remote("not a schedule fake".into()))
        }

        async fn pull_slots(
            &self,
            _token: &str,
            _since: &str,
        ) -> Result<SlotPullResponse, EngineError> {
            Err(EngineError::Remote("not a schedule fake".into()))
        }
    }

    type Engine = TaskSyncEngine<FakeApi, SqliteTaskStore, InMemoryCredentialStore, InMemoryWatermarkStore>;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("plansync.db");
        initialize_database(&db_path).expect("init");
        let engine = TaskSyncEngine::new(
            Arc::new(FakeApi::default()),
            Arc::new(SqliteTaskStore::new(db_path)),
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

    fn pending_create(local_id: &str, title: &str) -> Task {
        Task {
            local_id: local_id.to_string(),
            owner_id: 7,
            server_id: None,
            title: title.to_string(),
            detail: String::new(),
            due_time: None,
            tag: String::new(),
            quadrant: 4,
            progress: Progress::NotYet,
            created_at: Some(1_000),
            updated_at: Some(1_000),
            deleted_at: None,
            pending_action: PendingAction::Create,
            local_mutation_clock: 1_000,
        }
    }

    fn dto(server_id: i64, title: &str, updated_time: &str) -> TaskDto {
        TaskDto {
            server_id,
            owner_id: 7,
            title: title.to_string(),
            detail: String::new(),
            due_time: None,
            tag: String::new(),
            quadrant: 4,
            progress: 0,
            created_time: None,
            updated_time: updated_time.to_string(),
            deleted_time: None,
        }
    }

    #[tokio::test]
    async fn push_then_pull_does_not_duplicate_the_record() {
        let (_dir, engine) = engine();
        engine.tasks.upsert(&pending_create("a", "Write report")).expect("seed");

        engine.api.queue_push(Ok(TaskPushResponse {
            results: vec![TaskPushResult {
                client_local_id: "a".to_string(),
                server_id: Some(42),
                updated_time: "1970-01-02 00:00:00.000".to_string(),
                status: "ok".to_string(),
            }],
        }));
        engine.api.queue_pull(Ok(TaskPullResponse {
            server_time: "1970-01-02 00:00:01.000".to_string(),
            items: vec![dto(42, "Write report", "1970-01-02 00:00:00.000")],
        }));

        let outcome = engine.sync_once().await.expect("sync");
        assert_eq!(outcome.pushed, 1);
        assert_eq!(outcome.pulled, 0);

        let all = engine.tasks.active(7).expect("active");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].local_id, "a");
        assert_eq!(all[0].server_id, Some(42));
        assert_eq!(all[0].pending_action, PendingAction::None);
    }

    #[tokio::test]
    async fn first_pull_uses_the_epoch_watermark_then_advances() {
        let (_dir, engine) = engine();
        engine.api.queue_pull(Ok(TaskPullResponse {
            server_time: "1970-01-02 00:00:01.000".to_string(),
            items: vec![dto(42, "Remote", "1970-01-02 00:00:00.000")],
        }));
        engine.api.queue_pull(Ok(TaskPullResponse {
            server_time: "1970-01-03 00:00:00.000".to_string(),
            items: vec![],
        }));

        assert_eq!(engine.pull_incremental().await.expect("pull"), 1);
        assert_eq!(
            engine.api.last_since.lock().unwrap().as_deref(),
            Some(INITIAL_WATERMARK)
        );

        engine.pull_incremental().await.expect("pull");
        assert_eq!(
            engine.api.last_since.lock().unwrap().as_deref(),
            Some("1970-01-02 00:00:01.000")
        );
    }

    #[tokio::test]
    async fn redelivered_pull_applies_nothing() {
        let (_dir, engine) = engine();
        let payload = TaskPullResponse {
            server_time: "1970-01-02 00:00:01.000".to_string(),
            items: vec![dto(42, "Remote", "1970-01-02 00:00:00.000")],
        };
        engine.api.queue_pull(Ok(payload.clone()));
        engine.api.queue_pull(Ok(payload));

        assert_eq!(engine.pull_incremental().await.expect("pull"), 1);
        assert_eq!(engine.pull_incremental().await.expect("pull"), 0);
        assert_eq!(engine.tasks.active(7).expect("active").len(), 1);
    }

    #[tokio::test]
    async fn push_failure_leaves_flags_and_skips_pull() {
        let (_dir, engine) = engine();
        engine.tasks.upsert(&pending_create("a", "Write report")).expect("seed");
        engine.api.queue_push(Err(EngineError::Remote("server down".into())));

        assert!(engine.sync_once().await.is_err());
        assert_eq!(engine.api.pull_calls.load(Ordering::SeqCst), 0);

        let row = engine.tasks.find_by_local_id("a").expect("find").expect("row");
        assert_eq!(row.pending_action, PendingAction::Create);
        assert_eq!(
            engine.watermarks.load(7, RecordKind::Tasks).expect("load"),
            None
        );
    }

    #[tokio::test]
    async fn confirmed_delete_push_removes_the_row() {
        let (_dir, engine) = engine();
        let mut doomed = pending_create("a", "old");
        doomed.server_id = Some(42);
        doomed.pending_action = PendingAction::Delete;
        engine.tasks.upsert(&doomed).expect("seed");

        engine.api.queue_push(Ok(TaskPushResponse {
            results: vec![TaskPushResult {
                client_local_id: "a".to_string(),
                server_id: Some(42),
                updated_time: "1970-01-02 00:00:00.000".to_string(),
                status: "deleted".to_string(),
            }],
        }));

        assert_eq!(engine.push_pending().await.expect("push"), 1);
        assert!(engine.tasks.find_by_local_id("a").expect("find").is_none());
    }

    #[tokio::test]
    async fn remote_delete_removes_the_local_row() {
        let (_dir, engine) = engine();
        let mut synced = pending_create("a", "old");
        synced.server_id = Some(42);
        synced.pending_action = PendingAction::None;
        engine.tasks.upsert(&synced).expect("seed");

        let mut deleted = dto(42, "old", "1970-01-02 00:00:00.000");
        deleted.deleted_time = Some("1970-01-02 00:00:00.000".to_string());
        engine.api.queue_pull(Ok(TaskPullResponse {
            server_time: "1970-01-02 00:00:01.000".to_string(),
            items: vec![deleted],
        }));

        assert_eq!(engine.pull_incremental().await.expect("pull"), 1);
        assert!(engine.tasks.find_by_local_id("a").expect("find").is_none());
    }

    #[tokio::test]
    async fn pull_keeps_records_with_unpushed_edits() {
        let (_dir, engine) = engine();
        let mut edited = pending_create("a", "local edit");
        edited.server_id = Some(42);
        edited.pending_action = PendingAction::Update;
        engine.tasks.upsert(&edited).expect("seed");

        engine.api.queue_pull(Ok(TaskPullResponse {
            server_time: "1970-01-02 00:00:01.000".to_string(),
            items: vec![dto(42, "stale remote title", "1970-01-02 00:00:00.000")],
        }));

        assert_eq!(engine.pull_incremental().await.expect("pull"), 0);
        let row = engine.tasks.find_by_local_id("a").expect("find").expect("row");
        assert_eq!(row.title, "local edit");
    }

    #[tokio::test]
    async fn concurrent_cycle_reports_busy() {
        let (_dir, engine) = engine();
        let _guard = engine.cycle.lock().await;
        assert!(matches!(
            engine.sync_once().await,
            Err(EngineError::SyncBusy)
        ));
    }
}
