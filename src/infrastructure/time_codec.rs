use crate::domain::time::end_of_day;
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Offset of the zone the remote service is pinned to, in minutes.
///
/// The remote exchanges naive datetime strings and epoch-style millisecond
/// fields expressed in one fixed zone; this is a deliberate simplification,
/// not a timezone model. The default matches the production deployment
/// (UTC+8).
pub const DEFAULT_WIRE_OFFSET_MINUTES: i32 = 8 * 60;

const NAIVE_PATTERN: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Converts between local naive wall-clock milliseconds and the wire time
/// representation: ISO-8601 or fixed-pattern naive strings for timestamps,
/// offset-corrected millisecond counts for schedule clock fields.
#[derive(Debug, Clone)]
pub struct WireTimeCodec {
    offset: FixedOffset,
}

impl Default for WireTimeCodec {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(DEFAULT_WIRE_OFFSET_MINUTES * 60)
                .expect("default offset is in range"),
        }
    }
}

impl WireTimeCodec {
    pub fn new(offset_minutes: i32) -> Result<Self, EngineError> {
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            EngineError::InvalidConfig(format!("wire offset {offset_minutes}m out of range"))
        })?;
        Ok(Self { offset })
    }

    pub fn offset_millis(&self) -> i64 {
        i64::from(self.offset.local_minus_utc()) * 1_000
    }

    /// Local wall-clock millis -> wire millis (strip the fixed offset).
    pub fn to_wire_millis(&self, local: i64) -> i64 {
        local - self.offset_millis()
    }

    /// Wire millis -> local wall-clock millis.
    pub fn from_wire_millis(&self, wire: i64) -> i64 {
        wire + self.offset_millis()
    }

    /// Parse a server timestamp into local wall-clock millis.
    ///
    /// ISO-8601/offset strings are converted via the configured wire offset;
    /// if that fails, the string is retried as a naive datetime in the wire
    /// zone's wall clock. Anything else falls back to `now` - a data-quality
    /// issue, never fatal to the sync cycle.
    pub fn parse_server_time(&self, raw: &str, now: i64) -> i64 {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return self.from_wire_millis(parsed.timestamp_millis());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, NAIVE_PATTERN) {
            return naive.and_utc().timestamp_millis();
        }
        tracing::warn!(raw, "unparseable server timestamp, falling back to now");
        now
    }

    /// Format local wall-clock millis as the wire's naive datetime string.
    pub fn format_server_time(&self, local: i64) -> String {
        DateTime::<Utc>::from_timestamp_millis(local)
            .unwrap_or_default()
            .naive_utc()
            .format(NAIVE_PATTERN)
            .to_string()
    }

    /// Due times cross the wire date-granular: the last millisecond of the
    /// stored local calendar day, regardless of the stored time-of-day.
    pub fn format_due_time(&self, due_local: i64) -> String {
        self.format_server_time(end_of_day(due_local))
    }
}
