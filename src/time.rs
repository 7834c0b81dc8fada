use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn now_ms() -> i64 {
    now().timestamp_millis()
}

/// Stored timestamps are epoch milliseconds; out-of-range values collapse to the epoch.
pub fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Monday 00:00 UTC of the week containing `at`.
pub fn start_of_week(at: DateTime<Utc>) -> DateTime<Utc> {
    let offset = (7 + at.weekday().num_days_from_monday()) % 7;
    let monday = at.date_naive() - Duration::days(i64::from(offset));
    Utc.from_utc_datetime(&monday.and_time(NaiveTime::MIN))
}

/// Exclusive end of the week that starts at `week_start`.
pub fn end_of_week(week_start: DateTime<Utc>) -> DateTime<Utc> {
    week_start + Duration::days(7)
}

/// "Jan 06 - Jan 12": first and last calendar day of the week.
pub fn week_label(week_start: DateTime<Utc>) -> String {
    let last_day = week_start + Duration::days(6);
    format!(
        "{} - {}",
        week_start.format("%b %d"),
        last_day.format("%b %d")
    )
}
