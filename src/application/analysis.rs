use crate::domain::models::ScheduleSlot;
use crate::domain::time::{DAY_MS, HOUR_MS};
use serde::Serialize;
use std::collections::BTreeMap;

/// Four fixed six-hour buckets of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 4] = [
        TimeBucket::Night,
        TimeBucket::Morning,
        TimeBucket::Afternoon,
        TimeBucket::Evening,
    ];

    pub const fn index(self) -> usize {
        match self {
            TimeBucket::Night => 0,
            TimeBucket::Morning => 1,
            TimeBucket::Afternoon => 2,
            TimeBucket::Evening => 3,
        }
    }

    /// Bucket bounds as millisecond offsets from midnight.
    pub const fn bounds(self) -> (i64, i64) {
        match self {
            TimeBucket::Night => (0, 6 * HOUR_MS),
            TimeBucket::Morning => (6 * HOUR_MS, 12 * HOUR_MS),
            TimeBucket::Afternoon => (12 * HOUR_MS, 18 * HOUR_MS),
            TimeBucket::Evening => (18 * HOUR_MS, 24 * HOUR_MS),
        }
    }
}

/// Scheduled milliseconds in one bucket, split by linkage kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketTotals {
    pub total: i64,
    pub task: i64,
    pub free: i64,
}

impl BucketTotals {
    fn add(&mut self, duration: i64, task_linked: bool) {
        self.total += duration;
        if task_linked {
            self.task += duration;
        } else {
            self.free += duration;
        }
    }

    fn merge(&mut self, other: &BucketTotals) {
        self.total += other.total;
        self.task += other.task;
        self.free += other.free;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayBuckets {
    pub buckets: [BucketTotals; 4],
}

impl DayBuckets {
    pub fn bucket(&self, bucket: TimeBucket) -> &BucketTotals {
        &self.buckets[bucket.index()]
    }

    pub fn merge(&mut self, other: &DayBuckets) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            mine.merge(theirs);
        }
    }

    pub fn total(&self) -> BucketTotals {
        let mut total = BucketTotals::default();
        for bucket in &self.buckets {
            total.merge(bucket);
        }
        total
    }
}

/// Walks a slot across the bucket boundaries of its own day and accumulates
/// the clipped duration per bucket. A slot reaching outside the day is
/// clipped to it first.
pub fn bucket_slots_for_day<'a>(
    day_anchor: i64,
    slots: impl IntoIterator<Item = &'a ScheduleSlot>,
) -> DayBuckets {
    let mut day = DayBuckets::default();
    for slot in slots {
        let start = slot.start_time.max(day_anchor) - day_anchor;
        let end = slot.end_time.min(day_anchor + DAY_MS) - day_anchor;
        if end <= start {
            continue;
        }
        for bucket in TimeBucket::ALL {
            let (lo, hi) = bucket.bounds();
            let overlap = end.min(hi) - start.max(lo);
            if overlap > 0 {
                day.buckets[bucket.index()].add(overlap, slot.is_task_linked());
            }
        }
    }
    day
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub overall: DayBuckets,
    pub per_day: BTreeMap<i64, DayBuckets>,
}

/// Groups slots by their day anchor, buckets each day, then merges the days
/// into an overall distribution.
pub fn summarize(slots: &[ScheduleSlot]) -> AnalysisSummary {
    let mut by_day: BTreeMap<i64, Vec<&ScheduleSlot>> = BTreeMap::new();
    for slot in slots {
        by_day.entry(slot.day_anchor).or_default().push(slot);
    }

    let mut summary = AnalysisSummary::default();
    for (day_anchor, day_slots) in by_day {
        let day = bucket_slots_for_day(day_anchor, day_slots);
        summary.overall.merge(&day);
        summary.per_day.insert(day_anchor, day);
    }
    summary
}
