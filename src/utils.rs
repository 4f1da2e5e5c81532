use base64::{engine, Engine};
use time::macros::format_description;
use time::{format_description::FormatItem, Duration, OffsetDateTime};

const ISO8601_MILLIS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// Current UTC time truncated to millisecond precision, the resolution we render timestamps with.
pub fn now_millis() -> OffsetDateTime {
    truncate_millis(OffsetDateTime::now_utc())
}

pub fn truncate_millis(t: OffsetDateTime) -> OffsetDateTime {
    t - Duration::nanoseconds(i64::from(t.nanosecond() % 1_000_000))
}

/// A timestamp strictly after `prev`, preferring the current time.
pub fn next_after(prev: Option<OffsetDateTime>) -> OffsetDateTime {
    let now = now_millis();
    match prev {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

/// ISO-8601 rendering in UTC, e.g. `2024-05-01T12:00:00.123Z`.
pub fn iso8601(t: OffsetDateTime) -> String {
    t.to_offset(time::UtcOffset::UTC)
        .format(ISO8601_MILLIS)
        .unwrap_or_else(|_| t.unix_timestamp().to_string())
}

pub fn b64_decode(enc: &str) -> Result<Vec<u8>, base64::DecodeError> {
    engine::general_purpose::STANDARD.decode(enc.trim())
}
