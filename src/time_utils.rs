//! Time-of-day helpers for route keys and movement bins.
//!
//! Timestamps are seconds on a common clock. Labels are derived from the
//! time of day (`timestamp mod 86400`), so a Unix timestamp renders in UTC.

const SECONDS_PER_DAY: f64 = 86_400.0;
const MINUTES_PER_DAY: u32 = 24 * 60;

/// Minute of the day in `0..1440`.
pub fn minute_of_day(timestamp: f64) -> u32 {
    if !timestamp.is_finite() {
        return 0;
    }
    let seconds = timestamp.rem_euclid(SECONDS_PER_DAY);
    ((seconds / 60.0).floor() as u32).min(MINUTES_PER_DAY - 1)
}

/// Format a minute of the day as `HHMM`.
pub fn format_hhmm(minute: u32) -> String {
    format!("{:02}{:02}", minute / 60, minute % 60)
}

/// `HHMM` label of a timestamp.
///
/// # Example
/// ```
/// use trajectory_matcher::time_utils::hhmm;
/// assert_eq!(hhmm(9.0 * 3600.0 + 5.0 * 60.0 + 30.0), "0905");
/// ```
pub fn hhmm(timestamp: f64) -> String {
    format_hhmm(minute_of_day(timestamp))
}

/// Label of the `bin_minutes`-wide bin containing `timestamp`, e.g. `"0900~0930"`.
///
/// A bin reaching past midnight ends on the next day's clock (`"2330~0000"`).
/// A zero `bin_minutes` is treated as 1.
pub fn time_bin_label(timestamp: f64, bin_minutes: u32) -> String {
    let width = bin_minutes.max(1);
    let start = minute_of_day(timestamp) / width * width;
    let end = (start + width) % MINUTES_PER_DAY;
    format!("{}~{}", format_hhmm(start), format_hhmm(end))
}
