use chrono::{DateTime, Duration, ParseError, Timelike, Utc};

/// Parse a client-supplied date string (RFC 3339).
pub fn parse_raw_date(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Truncate a timestamp to the start of its hour. Bookable slots are
/// identified by this value alone.
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap()
        .and_utc()
}

pub fn is_past(ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    ts < now
}

/// Whether `now` still leaves at least `lead_hours` before `slot`. Strict:
/// exactly `lead_hours` before the slot is already too late.
pub fn lead_time_satisfied(slot: DateTime<Utc>, now: DateTime<Utc>, lead_hours: i64) -> bool {
    now < slot - Duration::hours(lead_hours)
}
