//! ISO-8601 parsing shared by both extraction paths.
//!
//! Offset-bearing timestamps are taken as-is. Naive timestamps and bare
//! dates are resolved in the request timezone so `end >= start` can be
//! checked on a common timeline.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp into an instant. `None` when unparseable.
pub fn parse_timestamp(value: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    // RFC 3339 requires seconds; models often drop them.
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(stripped) = value.strip_suffix('Z') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M") {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return localize(naive, tz);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| localize(naive, tz))
}

/// Whether `value` parses as a timestamp.
pub fn is_parseable(value: &str, tz: Tz) -> bool {
    parse_timestamp(value, tz).is_some()
}

/// Resolve a naive local time in `tz`. Ambiguous (fall-back) times take
/// the earlier instant; nonexistent (spring-forward) times yield `None`.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an IANA zone name.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Parse a zone name, falling back to the default zone and then UTC.
pub fn resolve_timezone(name: &str) -> Tz {
    parse_timezone(name)
        .or_else(|| parse_timezone(config::DEFAULT_TIMEZONE))
        .unwrap_or(Tz::UTC)
}

/// Reference instant for relative phrases, expressed in `tz`.
/// Unparseable or absent references fall back to now.
pub fn resolve_reference(reference: Option<&str>, tz: Tz) -> DateTime<Tz> {
    let instant = match reference {
        Some(value) => parse_timestamp(value, tz).unwrap_or_else(|| {
            tracing::debug!("Unparseable reference date, anchoring to now");
            Utc::now()
        }),
        None => Utc::now(),
    };
    instant.with_timezone(&tz)
}
