use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};

use crate::error::InvalidQueryError;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// A closed `[start, end]` interval in UTC. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidQueryError> {
        if start > end {
            return Err(InvalidQueryError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// The full calendar month before the one containing `now`, ending one second before
/// the current month starts.
pub fn previous_calendar_month(now: DateTime<Utc>) -> TimeWindow {
    let current_month = first_of_month(now.date_naive());
    let previous_month = first_of_month(current_month - Duration::days(1));
    TimeWindow {
        start: midnight_utc(previous_month),
        end: midnight_utc(current_month) - Duration::seconds(1),
    }
}

pub fn default_last_24h(now: DateTime<Utc>) -> TimeWindow {
    TimeWindow {
        start: now - Duration::hours(24),
        end: now,
    }
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .map(midnight_utc)
}

/// Builds the query window from optional client bounds. Each missing bound falls back
/// independently to the last-24h default.
pub fn resolve_window(
    start_raw: Option<&str>,
    end_raw: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TimeWindow, InvalidQueryError> {
    let fallback = default_last_24h(now);
    let start = parse_bound("start_time", start_raw)?.unwrap_or(fallback.start);
    let end = parse_bound("end_time", end_raw)?.unwrap_or(fallback.end);
    TimeWindow::new(start, end)
}

fn parse_bound(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, InvalidQueryError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| InvalidQueryError::InvalidTimestamp {
                field,
                value: value.to_string(),
            }),
    }
}

pub fn format_reporting_period(window: &TimeWindow) -> String {
    format!(
        "Reporting Period: {} to {}",
        window.start.format("%B %d, %Y"),
        window.end.format("%B %d, %Y")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .expect("valid utc")
    }

    #[test]
    fn previous_month_spans_whole_month() {
        let window = previous_calendar_month(utc(2025, 4, 17, 9, 30, 0));
        assert_eq!(window.start(), utc(2025, 3, 1, 0, 0, 0));
        assert_eq!(window.end(), utc(2025, 3, 31, 23, 59, 59));
    }

    #[test]
    fn previous_month_rolls_over_year_boundary() {
        let window = previous_calendar_month(utc(2026, 1, 1, 0, 0, 0));
        assert_eq!(window.start(), utc(2025, 12, 1, 0, 0, 0));
        assert_eq!(window.end(), utc(2025, 12, 31, 23, 59, 59));
    }

    #[test]
    fn previous_month_ends_one_second_before_current_month() {
        let mut now = utc(2023, 1, 31, 23, 59, 59);
        for _ in 0..40 {
            let window = previous_calendar_month(now);
            let current_start = first_of_month(now.date_naive());
            assert_eq!(window.end() + Duration::seconds(1), midnight_utc(current_start));
            assert_eq!(window.start().day(), 1);
            assert!(window.start() <= window.end());
            now += Duration::days(17) + Duration::hours(5);
        }
    }

    #[test]
    fn leap_february_is_covered() {
        let window = previous_calendar_month(utc(2024, 3, 2, 12, 0, 0));
        assert_eq!(window.start(), utc(2024, 2, 1, 0, 0, 0));
        assert_eq!(window.end(), utc(2024, 2, 29, 23, 59, 59));
    }

    #[test]
    fn default_window_is_last_day() {
        let now = utc(2025, 6, 10, 8, 0, 0);
        let window = default_last_24h(now);
        assert_eq!(window.start(), utc(2025, 6, 9, 8, 0, 0));
        assert_eq!(window.end(), now);
    }

    #[test]
    fn resolve_window_defaults_each_bound_independently() {
        let now = utc(2025, 6, 10, 8, 0, 0);
        let window = resolve_window(Some("2025-06-10T00:00:00Z"), None, now).expect("window");
        assert_eq!(window.start(), utc(2025, 6, 10, 0, 0, 0));
        assert_eq!(window.end(), now);

        let window = resolve_window(None, Some(""), now).expect("window");
        assert_eq!(window, default_last_24h(now));
    }

    #[test]
    fn resolve_window_normalizes_offsets_to_utc() {
        let now = utc(2025, 6, 10, 8, 0, 0);
        let window = resolve_window(
            Some("2025-06-09T20:00:00-04:00"),
            Some("2025-06-10 02:00:00"),
            now,
        )
        .expect("window");
        assert_eq!(window.start(), utc(2025, 6, 10, 0, 0, 0));
        assert_eq!(window.end(), utc(2025, 6, 10, 2, 0, 0));
    }

    #[test]
    fn resolve_window_rejects_garbage_and_inverted_bounds() {
        let now = utc(2025, 6, 10, 8, 0, 0);
        let err = resolve_window(Some("yesterday"), None, now).unwrap_err();
        assert!(matches!(
            err,
            InvalidQueryError::InvalidTimestamp { field: "start_time", .. }
        ));

        let err = resolve_window(Some("2025-06-11T00:00:00Z"), None, now).unwrap_err();
        assert!(matches!(err, InvalidQueryError::InvertedWindow { .. }));
    }

    #[test]
    fn reporting_period_uses_long_month_names() {
        let window = previous_calendar_month(utc(2025, 4, 3, 0, 0, 0));
        assert_eq!(
            format_reporting_period(&window),
            "Reporting Period: March 01, 2025 to March 31, 2025"
        );
    }

    #[test]
    fn parses_common_iso_shapes() {
        let expected = utc(2025, 1, 2, 3, 4, 5);
        for raw in [
            "2025-01-02T03:04:05Z",
            "2025-01-02T03:04:05+00:00",
            "2025-01-02 03:04:05",
            "2025-01-02T03:04:05.000",
            "2025-01-02 05:04:05+02:00",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_timestamp("2025-01-02"), Some(utc(2025, 1, 2, 0, 0, 0)));
        assert_eq!(parse_timestamp("not a time"), None);
    }
}
