//! Time utilities: parsing HH:MM, wraparound durations, quarter-hour rounding.

use chrono::{NaiveTime, Timelike};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Shortest block the system accepts, in minutes.
pub const MIN_BLOCK_MINUTES: i64 = 15;

/// Longest block the system accepts, in minutes.
pub const MAX_BLOCK_MINUTES: i64 = 120;

pub fn parse_time(t: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(t.trim(), "%H:%M").ok()
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// `--:--` stands in for a missing time.
pub fn format_opt_time(t: Option<NaiveTime>) -> String {
    t.map(format_time).unwrap_or_else(|| "--:--".to_string())
}

/// Minutes elapsed since midnight.
pub fn minute_of_day(t: NaiveTime) -> i64 {
    (t.hour() * 60 + t.minute()) as i64
}

/// Build a time of day from a minute count, wrapping within 24 hours.
pub fn from_minute_of_day(mins: i64) -> NaiveTime {
    let m = mins.rem_euclid(MINUTES_PER_DAY);
    NaiveTime::from_num_seconds_from_midnight_opt((m * 60) as u32, 0).unwrap_or_default()
}

pub fn add_minutes(t: NaiveTime, delta: i64) -> NaiveTime {
    from_minute_of_day(minute_of_day(t) + delta)
}

/// Elapsed minutes from `start` to `end`; `end <= start` crosses midnight.
pub fn elapsed_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    let diff = minute_of_day(end) - minute_of_day(start);
    if diff <= 0 {
        diff + MINUTES_PER_DAY
    } else {
        diff
    }
}

/// Minutes from `anchor` forward to `t` on a 24h dial, in `0..1440`.
pub fn offset_from(anchor: NaiveTime, t: NaiveTime) -> i64 {
    (minute_of_day(t) - minute_of_day(anchor)).rem_euclid(MINUTES_PER_DAY)
}

pub fn round_quarter(hours: f64) -> f64 {
    (hours * 4.0).round() / 4.0
}

/// Quarter-hour rounded duration in hours, `None` when an endpoint is missing.
pub fn duration_hours(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Option<f64> {
    let (s, e) = (start?, end?);
    Some(round_quarter(elapsed_minutes(s, e) as f64 / 60.0))
}

/// True when the block length is within `[15, 120]` minutes.
pub fn is_duration_valid(start: NaiveTime, end: NaiveTime) -> bool {
    let m = elapsed_minutes(start, end);
    (MIN_BLOCK_MINUTES..=MAX_BLOCK_MINUTES).contains(&m)
}

pub fn format_hours(hours: f64) -> String {
    format!("{:.2}", hours)
}

/// Snap a wall-clock reading to the nearest quarter hour.
pub fn round_to_quarter(t: NaiveTime) -> NaiveTime {
    let m = minute_of_day(t);
    from_minute_of_day(((m as f64 / 15.0).round() as i64) * 15)
}

pub fn format_minutes(mins: i64) -> String {
    let sign = if mins < 0 { "-" } else { "" };
    let m = mins.abs();
    format!("{}{:02}:{:02}", sign, m / 60, m % 60)
}
