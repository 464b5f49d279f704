//! Calendar boundaries in the wall-clock time of the instant's time zone.

use chrono::{DateTime, Datelike, DurationRound, TimeDelta, TimeZone};

const ONE_HOUR: TimeDelta = TimeDelta::hours(1);

#[must_use]
pub fn start_of_hour<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    // Truncation only fails for instants near the representable limits.
    instant.clone().duration_trunc(ONE_HOUR).unwrap_or_else(|_| instant.clone())
}

#[must_use]
pub fn start_of_next_hour<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    start_of_hour(&(instant.clone() + ONE_HOUR))
}

/// One second past midnight of the first day of the next month.
///
/// The extra second keeps the month alarm strictly after the hour alarm at midnight.
/// Returns [`None`] if that local time does not exist in the time zone.
#[must_use]
pub fn start_of_next_month<Tz: TimeZone>(instant: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let (year, month) = if instant.month() == 12 {
        (instant.year() + 1, 1)
    } else {
        (instant.year(), instant.month() + 1)
    };
    instant.timezone().with_ymd_and_hms(year, month, 1, 0, 0, 1).earliest()
}

/// Signed number of seconds from `rhs` to `lhs`.
#[must_use]
pub fn seconds_between<Tz: TimeZone>(lhs: &DateTime<Tz>, rhs: &DateTime<Tz>) -> f64 {
    (lhs.clone() - rhs.clone()).as_seconds_f64()
}
