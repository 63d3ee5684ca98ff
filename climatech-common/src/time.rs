//! Date utilities
//!
//! Capture dates are stored as `YYYY-MM-DD` text. Imagery file names carry
//! the acquisition date as a 7-digit `YYYYDDD` year/day-of-year token, and the
//! imagery API expects `MM-DD-YYYY` in task descriptors.

use chrono::{Duration, NaiveDate, Utc};

/// Storage format for capture dates
pub const CAPTURE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format used in imagery task descriptors
pub const TASK_DATE_FORMAT: &str = "%m-%d-%Y";

/// Current UTC calendar date
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `date` minus `days` calendar days
pub fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date - Duration::days(i64::from(days))
}

/// Decode a `YYYYDDD` token (e.g. `2023153` → 2023-06-02)
///
/// Returns `None` for anything that is not exactly seven ASCII digits or
/// names a day the year does not have.
pub fn parse_year_doy(token: &str) -> Option<NaiveDate> {
    if token.len() != 7 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = token[..4].parse().ok()?;
    let doy: u32 = token[4..].parse().ok()?;
    NaiveDate::from_yo_opt(year, doy)
}

pub fn format_capture_date(date: NaiveDate) -> String {
    date.format(CAPTURE_DATE_FORMAT).to_string()
}

pub fn parse_capture_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, CAPTURE_DATE_FORMAT).ok()
}

pub fn format_task_date(date: NaiveDate) -> String {
    date.format(TASK_DATE_FORMAT).to_string()
}
