pub mod analysis;
pub mod schedule;
pub mod schedule_sync;
pub mod task_sync;
pub mod tasks;

use std::sync::Arc;

/// Injectable clock returning local wall-clock milliseconds. Production wires
/// `crate::domain::time::local_now_millis`; tests pin a fixed value.
pub type NowProvider = Arc<dyn Fn() -> i64 + Send + Sync>;
