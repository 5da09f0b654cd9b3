//! Subject-line time ranges, e.g. calendar invite subjects:
//! `Friday, August 29, 01:00PM - 02:00PM (EDT - America/Port-au-Prince)`.
//!
//! Narrow by design: anything else is a non-match (`None`), not an error.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use serde::Serialize;

use super::dates::month_from_name;

const SUBJECT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Local, offset-less start/end with second precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRange {
    pub start_iso: String,
    pub end_iso: String,
}

struct SubjectPatterns {
    with_weekday: Regex,
    without_weekday: Regex,
}

const DATE_AND_RANGE: &str = r"(?P<mon>[A-Za-z]{3,9})\.?\s+(?P<day>\d{1,2})(?:st|nd|rd|th)?,?\s+(?P<sh>\d{1,2}):(?P<sm>\d{2})\s*(?P<sap>[AaPp][Mm])\s*-\s*(?P<eh>\d{1,2}):(?P<em>\d{2})\s*(?P<eap>[AaPp][Mm])";

static PATTERNS: LazyLock<SubjectPatterns> = LazyLock::new(|| SubjectPatterns {
    with_weekday: Regex::new(&format!(r"(?P<wd>[A-Za-z]+),?\s+{DATE_AND_RANGE}"))
        .expect("valid subject pattern"),
    without_weekday: Regex::new(DATE_AND_RANGE).expect("valid subject pattern"),
});

/// Parse a subject line relative to the local clock.
pub fn parse_subject_range(subject: &str) -> Option<SubjectRange> {
    parse_subject_range_at(subject, chrono::Local::now().naive_local())
}

/// Parse a subject line relative to `now`.
///
/// The year is `now`'s year, rolled forward once if the start is already past.
/// An end not strictly after the start becomes start + 1h.
pub fn parse_subject_range_at(subject: &str, now: NaiveDateTime) -> Option<SubjectRange> {
    let subject = subject.replace(['–', '—'], "-");
    let p = &*PATTERNS;

    let caps = p
        .with_weekday
        .captures(&subject)
        .filter(|caps| caps.name("mon").and_then(|m| month_from_name(m.as_str())).is_some())
        .or_else(|| p.without_weekday.captures(&subject))?;

    let month = month_from_name(caps.name("mon")?.as_str())?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let start_time = clock(&caps, "sh", "sm", "sap")?;
    let end_time = clock(&caps, "eh", "em", "eap")?;

    let mut date = NaiveDate::from_ymd_opt(now.year(), month, day)?;
    if date.and_time(start_time) < now {
        date = NaiveDate::from_ymd_opt(now.year() + 1, month, day)?;
    }

    let start = date.and_time(start_time);
    let mut end = date.and_time(end_time);
    if end <= start {
        end = start + Duration::hours(1);
    }

    Some(SubjectRange {
        start_iso: start.format(SUBJECT_FORMAT).to_string(),
        end_iso: end.format(SUBJECT_FORMAT).to_string(),
    })
}

fn clock(caps: &Captures, hour: &str, minute: &str, meridiem: &str) -> Option<NaiveTime> {
    let hour: u32 = caps.name(hour)?.as_str().parse().ok()?;
    let minute: u32 = caps.name(minute)?.as_str().parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = caps.name(meridiem)?.as_str().eq_ignore_ascii_case("pm");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn parses_invite_subject() {
        let range = parse_subject_range_at(
            "Friday, August 29, 01:00PM - 02:00PM (EDT - America/Port-au-Prince)",
            at(2025, 8, 1),
        )
        .unwrap();
        assert_eq!(range.start_iso, "2025-08-29T13:00:00");
        assert_eq!(range.end_iso, "2025-08-29T14:00:00");
    }

    #[test]
    fn past_date_rolls_forward_one_year() {
        let range = parse_subject_range_at(
            "Friday, August 29, 01:00PM - 02:00PM (EDT - America/Port-au-Prince)",
            at(2025, 9, 15),
        )
        .unwrap();
        assert_eq!(range.start_iso, "2026-08-29T13:00:00");
        assert_eq!(range.end_iso, "2026-08-29T14:00:00");
    }

    #[test]
    fn en_dash_and_no_weekday() {
        let range = parse_subject_range_at("Aug 29 9:30am – 10:15am", at(2025, 8, 1)).unwrap();
        assert_eq!(range.start_iso, "2025-08-29T09:30:00");
        assert_eq!(range.end_iso, "2025-08-29T10:15:00");
    }

    #[test]
    fn prefixed_subject_still_matches() {
        let range = parse_subject_range_at(
            "Invitation: Design review @ Tuesday, September 2, 11:00AM - 12:00PM",
            at(2025, 8, 1),
        )
        .unwrap();
        assert_eq!(range.start_iso, "2025-09-02T11:00:00");
        assert_eq!(range.end_iso, "2025-09-02T12:00:00");
    }

    #[test]
    fn end_not_after_start_defaults_to_one_hour() {
        let range = parse_subject_range_at("August 29, 03:00PM - 03:00PM", at(2025, 8, 1)).unwrap();
        assert_eq!(range.end_iso, "2025-08-29T16:00:00");
    }

    #[test]
    fn non_matching_subjects_are_none() {
        assert!(parse_subject_range_at("Re: lunch?", at(2025, 8, 1)).is_none());
        assert!(parse_subject_range_at("Smarch 29, 01:00PM - 02:00PM", at(2025, 8, 1)).is_none());
        assert!(parse_subject_range_at("February 30, 01:00PM - 02:00PM", at(2025, 1, 1)).is_none());
        assert!(parse_subject_range_at("August 29, 13:00PM - 02:00PM", at(2025, 1, 1)).is_none());
    }
}
