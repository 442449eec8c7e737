pub mod credential_store;
pub mod error;
pub mod schedule_store;
pub mod storage;
pub mod sync_client;
pub mod task_store;
pub mod time_codec;
pub mod watermark_store;
pub mod wire;
