use chrono::Local;

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

/// Midnight of the calendar day containing `millis`.
///
/// All stored times are naive wall-clock millisecond counts, so day math is
/// exact integer arithmetic with no DST corrections.
pub fn day_anchor(millis: i64) -> i64 {
    millis.div_euclid(DAY_MS) * DAY_MS
}

/// Last millisecond of the calendar day containing `millis`.
pub fn end_of_day(millis: i64) -> i64 {
    day_anchor(millis) + DAY_MS - 1
}

/// Round `value` up to the next multiple of `step`.
pub fn align_up(value: i64, step: i64) -> i64 {
    let rem = value.rem_euclid(step);
    if rem == 0 { value } else { value + (step - rem) }
}

/// Current wall-clock time as naive local milliseconds.
pub fn local_now_millis() -> i64 {
    Local::now().naive_local().and_utc().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_anchor_floors_to_midnight() {
        let noon = 3 * DAY_MS + 12 * HOUR_MS;
        assert_eq!(day_anchor(noon), 3 * DAY_MS);
        assert_eq!(day_anchor(3 * DAY_MS), 3 * DAY_MS);
    }

    #[test]
    fn day_anchor_handles_pre_epoch_values() {
        assert_eq!(day_anchor(-1), -DAY_MS);
        assert_eq!(day_anchor(-DAY_MS), -DAY_MS);
    }

    #[test]
    fn end_of_day_is_last_millisecond() {
        assert_eq!(end_of_day(5 * DAY_MS + 1), 6 * DAY_MS - 1);
    }

    #[test]
    fn align_up_rounds_to_step() {
        let step = 30 * MINUTE_MS;
        assert_eq!(align_up(0, step), 0);
        assert_eq!(align_up(1, step), step);
        assert_eq!(align_up(step, step), step);
        assert_eq!(align_up(step + 1, step), 2 * step);
    }
}
