//! Epoch day arithmetic and local time reconstruction

use chrono::{DateTime, Duration, LocalResult, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::errors::{DecodeError, DecodeResult};

pub const MILLIS_PER_MINUTE: i64 = 60_000;
pub const MILLIS_PER_DAY: i64 = 24 * 60 * MILLIS_PER_MINUTE;
pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Parse a named time zone such as `Europe/Berlin`
pub fn parse_time_zone(name: &str) -> DecodeResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| DecodeError::InvalidTimeZone {
            name: name.to_string(),
        })
}

pub fn epoch_day_to_millis(day: i64) -> i64 {
    day * MILLIS_PER_DAY
}

pub fn millis_to_epoch_day(millis: i64) -> i64 {
    millis.div_euclid(MILLIS_PER_DAY)
}

/// Current UTC epoch day
pub fn today_epoch_day() -> i64 {
    millis_to_epoch_day(Utc::now().timestamp_millis())
}

fn utc_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// `YYYY-MM-DD` of an epoch day, as used in day file names
pub fn format_epoch_day(day: i64) -> String {
    utc_from_millis(epoch_day_to_millis(day))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| day.to_string())
}

/// Combine the UTC calendar date of `day_epoch_millis` with a wall clock
/// time of `minutes` past local midnight in `tz`.
///
/// The seconds are pinned to :30 before truncating to the minute so DST
/// arithmetic can never push the result into the neighbouring minute.
/// Local times inside a DST gap move forward by an hour; ambiguous local
/// times resolve to the earlier instant.
pub fn resolve_local_minutes(day_epoch_millis: i64, tz: Tz, minutes: i64) -> DecodeResult<i64> {
    let invalid = |message: String| DecodeError::InvalidLocalTime { message };

    let date = utc_from_millis(day_epoch_millis)
        .ok_or_else(|| invalid(format!("day {} out of range", day_epoch_millis)))?
        .date_naive();

    let naive = date
        .and_hms_opt(0, 0, 30)
        .and_then(|midnight| midnight.checked_add_signed(Duration::minutes(minutes)))
        .ok_or_else(|| invalid(format!("{} minutes past {} out of range", minutes, date)))?;

    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .ok_or_else(|| invalid(format!("{} does not exist in {}", naive, tz)))?,
    };

    Ok(local
        .timestamp_millis()
        .div_euclid(MILLIS_PER_MINUTE)
        * MILLIS_PER_MINUTE)
}

/// Wall clock hour and minute of an instant in `tz`
pub fn local_hour_minute(millis: i64, tz: Tz) -> Option<(u32, u32)> {
    utc_from_millis(millis).map(|dt| {
        let local = dt.with_timezone(&tz);
        (local.hour(), local.minute())
    })
}
