//! Offline-first task and schedule engine.
//!
//! Records mutate locally first and carry a pending flag until a sync cycle
//! confirms them with the server. Cycles push confirmed-pending mutations,
//! then pull incrementally from a server-issued watermark; reconciliation is
//! idempotent, so redelivered pulls are harmless.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::NowProvider;
pub use application::analysis::{AnalysisSummary, BucketTotals, DayBuckets, TimeBucket, summarize};
pub use application::schedule::{SaveOutcome, ScheduleService};
pub use application::schedule_sync::ScheduleSyncEngine;
pub use application::task_sync::{SyncOutcome, TaskSyncEngine};
pub use application::tasks::{TaskDraft, TaskService};
pub use domain::models::{PendingAction, Progress, ScheduleSlot, SlotSyncState, SlotWithTask, Task};
pub use infrastructure::credential_store::{
    CredentialStore, InMemoryCredentialStore, KeychainCredentialStore, Session,
};
pub use infrastructure::error::EngineError;
pub use infrastructure::schedule_store::{AnalysisFilter, ScheduleStore, SqliteScheduleStore};
pub use infrastructure::storage::initialize_database;
pub use infrastructure::sync_client::{ReqwestSyncApi, SyncApi};
pub use infrastructure::task_store::{SqliteTaskStore, TaskStore};
pub use infrastructure::time_codec::WireTimeCodec;
pub use infrastructure::watermark_store::{
    RecordKind, SqliteWatermarkStore, WatermarkStore,
};
