//! Deterministic date/time recognition.
//!
//! `DateRecognizer` is the capability boundary: given text and a reference
//! instant, produce candidate spans with the byte offset where each date
//! phrase begins. `PhraseRecognizer` is the built-in regex implementation.
//! Hits are not validated here; the rule extractor filters them.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone,
    Weekday,
};
use chrono_tz::Tz;
use regex::{Captures, Regex};

/// Default time for "tonight" when no clock time is given.
const TONIGHT_HOUR: u32 = 20;

/// A candidate date/time span found in text.
#[derive(Debug, Clone, PartialEq)]
pub struct DateHit {
    pub start_iso: String,
    pub end_iso: Option<String>,
    /// Byte offset of the phrase in the scanned text.
    pub offset: usize,
    /// The matched phrase.
    pub text: String,
    /// No clock time was given; `start_iso` is local midnight.
    pub all_day: bool,
}

/// External date-phrase recognition capability.
pub trait DateRecognizer: Send + Sync {
    /// Find date/time phrases in `text`. With `forward_bias`, ambiguous
    /// relative phrases resolve to the future rather than the past.
    fn recognize(&self, text: &str, reference: DateTime<Tz>, forward_bias: bool) -> Vec<DateHit>;
}

/// Run the recognizer with forward bias, hits ordered by offset.
pub fn parse_dates(
    recognizer: &dyn DateRecognizer,
    text: &str,
    reference: DateTime<Tz>,
) -> Vec<DateHit> {
    let mut hits = recognizer.recognize(text, reference, true);
    hits.sort_by_key(|h| h.offset);
    hits
}

// ═══════════════════════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════════════════════

const MONTH: &str = r"(?P<mon>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?";
const WEEKDAY_PREFIX: &str =
    r"(?:(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)\.?,?\s+)?";
const CLOCK_STRICT: &str =
    r"(?:\d{1,2}(?::[0-5]\d)?\s*(?:a\.?m\.?|p\.?m\.?)|(?:[01]?\d|2[0-3]):[0-5]\d|noon|midnight)";
const CLOCK_LOOSE: &str = r"(?:\d{1,2}(?::[0-5]\d)?\s*(?:a\.?m\.?|p\.?m\.?)?|noon|midnight)";
const RANGE_SEP: &str = r"\s*(?:-|–|—|to|until|till)\s*";

fn timespec() -> String {
    format!(r"(?:{CLOCK_LOOSE}{RANGE_SEP}{CLOCK_STRICT}|{CLOCK_STRICT})")
}

/// Wrap a date pattern with an optional leading or trailing time spec.
fn with_times(date: &str) -> String {
    let ts = timespec();
    format!(
        r"(?i)\b(?:(?:at\s+)?(?P<pre>{ts})\s+(?:on\s+)?)?{date}(?:(?:\s*,)?\s+(?:at\s+|@\s*|from\s+|between\s+)?(?P<post>{ts}))?"
    )
}

struct Patterns {
    iso: Regex,
    month_day: Regex,
    day_month: Regex,
    numeric: Regex,
    relative: Regex,
    bare_time: Regex,
    clock_range: Regex,
    clock: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| {
    let month_day = format!(
        r"{WEEKDAY_PREFIX}{MONTH}\s+(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(?P<year>\d{{4}})\b)?"
    );
    let day_month = format!(
        r"{WEEKDAY_PREFIX}(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH}(?:,?\s+(?P<year>\d{{4}})\b)?"
    );
    let numeric =
        format!(r"{WEEKDAY_PREFIX}(?P<nmon>\d{{1,2}})/(?P<day>\d{{1,2}})(?:/(?P<year>\d{{4}}|\d{{2}}))?\b");
    let relative = r"(?P<rel>today|tonight|tomorrow|(?:(?P<modifier>this|next)\s+)?(?P<wd>monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b";
    let ts = timespec();

    Patterns {
        iso: Regex::new(
            r"\b(?P<date>\d{4}-\d{2}-\d{2})(?:[T ](?P<time>\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)(?P<off>Z|[+-]\d{2}:?\d{2})?)?",
        )
        .expect("valid iso pattern"),
        month_day: Regex::new(&with_times(&month_day)).expect("valid month-day pattern"),
        day_month: Regex::new(&with_times(&day_month)).expect("valid day-month pattern"),
        numeric: Regex::new(&with_times(&numeric)).expect("valid numeric pattern"),
        relative: Regex::new(&with_times(relative)).expect("valid relative pattern"),
        bare_time: Regex::new(&format!(r"(?i)\b(?:at|@)\s*(?P<post>{ts})"))
            .expect("valid bare time pattern"),
        clock_range: Regex::new(&format!(
            r"(?i)^(?P<a>{CLOCK_LOOSE})(?:{RANGE_SEP}(?P<b>{CLOCK_STRICT}))?$"
        ))
        .expect("valid clock range pattern"),
        clock: Regex::new(
            r"(?i)^(?:(?P<h>\d{1,2})(?::(?P<m>\d{2}))?\s*(?P<ap>[ap])?\.?(?:m\.?)?|(?P<word>noon|midnight))$",
        )
        .expect("valid clock pattern"),
    }
});

// ═══════════════════════════════════════════════════════════
// PhraseRecognizer
// ═══════════════════════════════════════════════════════════

/// Built-in recognizer for common English date/time phrases.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhraseRecognizer;

impl PhraseRecognizer {
    pub fn new() -> Self {
        Self
    }
}

/// A match before overlap removal. A phrase that matched but did not
/// resolve (e.g. "February 30") keeps `hit: None` so it still claims its
/// span and shadows the shorter phrases inside it.
struct Candidate {
    start: usize,
    end: usize,
    hit: Option<DateHit>,
}

impl DateRecognizer for PhraseRecognizer {
    fn recognize(&self, text: &str, reference: DateTime<Tz>, forward_bias: bool) -> Vec<DateHit> {
        let p = &*PATTERNS;
        let tz = reference.timezone();
        let mut candidates = Vec::new();

        for caps in p.iso.captures_iter(text) {
            candidates.push(candidate(&caps, |c| resolve_iso(c, tz)));
        }
        for regex in [&p.month_day, &p.day_month, &p.numeric, &p.relative] {
            for caps in regex.captures_iter(text) {
                candidates.push(candidate(&caps, |c| resolve_dated(c, reference, forward_bias)));
            }
        }
        for caps in p.bare_time.captures_iter(text) {
            candidates.push(candidate(&caps, |c| resolve_bare_time(c, reference, forward_bias)));
        }

        select_non_overlapping(candidates)
    }
}

fn candidate(caps: &Captures, resolve: impl FnOnce(&Captures) -> Option<DateHit>) -> Candidate {
    let (start, end) = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
    Candidate {
        start,
        end,
        hit: resolve(caps),
    }
}

/// Earliest start wins; among equal starts the longest match wins.
fn select_non_overlapping(mut candidates: Vec<Candidate>) -> Vec<DateHit> {
    candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut hits = Vec::new();
    let mut covered_until = 0usize;
    for c in candidates {
        if c.start < covered_until || c.start == c.end {
            continue;
        }
        covered_until = c.end;
        hits.extend(c.hit);
    }
    hits
}

fn resolve_iso(caps: &Captures, tz: Tz) -> Option<DateHit> {
    let whole = caps.get(0)?;
    let date = NaiveDate::parse_from_str(caps.name("date")?.as_str(), "%Y-%m-%d").ok()?;

    let (start_iso, all_day) = match caps.name("time") {
        None => (format_local(date.and_hms_opt(0, 0, 0)?, tz)?, true),
        Some(time) => {
            let time = parse_iso_clock(time.as_str())?;
            let naive = date.and_time(time);
            match caps.name("off") {
                Some(off) => {
                    let offset = off.as_str();
                    let offset = if offset == "Z" {
                        "+00:00".to_string()
                    } else if offset.contains(':') {
                        offset.to_string()
                    } else {
                        format!("{}:{}", &offset[..3], &offset[3..])
                    };
                    let stamp = format!("{}{}", naive.format("%Y-%m-%dT%H:%M:%S"), offset);
                    let dt = DateTime::parse_from_rfc3339(&stamp).ok()?;
                    (dt.to_rfc3339_opts(SecondsFormat::Secs, true), false)
                }
                None => (format_local(naive, tz)?, false),
            }
        }
    };

    Some(DateHit {
        start_iso,
        end_iso: None,
        offset: whole.start(),
        text: whole.as_str().to_string(),
        all_day,
    })
}

fn parse_iso_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn resolve_dated(
    caps: &Captures,
    reference: DateTime<Tz>,
    forward_bias: bool,
) -> Option<DateHit> {
    let whole = caps.get(0)?;
    let date = resolve_date(caps, reference.date_naive(), forward_bias)?;
    let spec = caps.name("post").or_else(|| caps.name("pre"));
    let times = match spec {
        Some(m) => Some(parse_time_spec(m.as_str())?),
        None => None,
    };
    let tonight = caps
        .name("rel")
        .is_some_and(|r| r.as_str().eq_ignore_ascii_case("tonight"));

    build_hit(date, times, tonight, reference.timezone(), whole.start(), whole.as_str())
}

fn resolve_bare_time(
    caps: &Captures,
    reference: DateTime<Tz>,
    forward_bias: bool,
) -> Option<DateHit> {
    let whole = caps.get(0)?;
    let (start_time, end_time) = parse_time_spec(caps.name("post")?.as_str())?;
    let tz = reference.timezone();
    let mut date = reference.date_naive();
    let reference_local = reference.naive_local();
    if forward_bias && date.and_time(start_time) < reference_local {
        date = date.succ_opt()?;
    }
    build_hit(date, Some((start_time, end_time)), false, tz, whole.start(), whole.as_str())
}

fn build_hit(
    date: NaiveDate,
    times: Option<(NaiveTime, Option<NaiveTime>)>,
    tonight: bool,
    tz: Tz,
    offset: usize,
    text: &str,
) -> Option<DateHit> {
    let (start_iso, end_iso, all_day) = match times {
        Some((start, end)) => {
            let start_iso = format_local(date.and_time(start), tz)?;
            let end_iso = match end {
                Some(end) => Some(format_local(date.and_time(end), tz)?),
                None => None,
            };
            (start_iso, end_iso, false)
        }
        None if tonight => (
            format_local(date.and_hms_opt(TONIGHT_HOUR, 0, 0)?, tz)?,
            None,
            false,
        ),
        None => (format_local(date.and_hms_opt(0, 0, 0)?, tz)?, None, true),
    };

    Some(DateHit {
        start_iso,
        end_iso,
        offset,
        text: text.to_string(),
        all_day,
    })
}

fn format_local(naive: NaiveDateTime, tz: Tz) -> Option<String> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

// ═══════════════════════════════════════════════════════════
// Date resolution
// ═══════════════════════════════════════════════════════════

fn resolve_date(caps: &Captures, today: NaiveDate, forward_bias: bool) -> Option<NaiveDate> {
    if let Some(rel) = caps.name("rel") {
        let rel = rel.as_str().to_ascii_lowercase();
        return match rel.as_str() {
            "today" | "tonight" => Some(today),
            "tomorrow" => today.succ_opt(),
            _ => {
                let weekday = weekday_from_name(caps.name("wd")?.as_str())?;
                let is_next = caps
                    .name("modifier")
                    .is_some_and(|m| m.as_str().eq_ignore_ascii_case("next"));
                Some(resolve_weekday(today, weekday, is_next, forward_bias))
            }
        };
    }

    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let month = match (caps.name("mon"), caps.name("nmon")) {
        (Some(name), _) => month_from_name(name.as_str())?,
        (None, Some(num)) => num.as_str().parse().ok()?,
        (None, None) => return None,
    };

    match caps.name("year") {
        Some(year) => {
            let mut year: i32 = year.as_str().parse().ok()?;
            if year < 100 {
                year += 2000;
            }
            NaiveDate::from_ymd_opt(year, month, day)
        }
        None => {
            let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if forward_bias && date < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(date)
            }
        }
    }
}

/// Bare weekdays resolve to the next occurrence on or after today;
/// "next" skips today. Without forward bias, bare weekdays look back.
fn resolve_weekday(today: NaiveDate, target: Weekday, is_next: bool, forward_bias: bool) -> NaiveDate {
    let from = i64::from(today.weekday().num_days_from_monday());
    let to = i64::from(target.num_days_from_monday());
    if !forward_bias && !is_next {
        let back = (from - to).rem_euclid(7);
        return today - Duration::days(back);
    }
    let mut ahead = (to - from).rem_euclid(7);
    if is_next && ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

pub(crate) fn month_from_name(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let weekday = match prefix.as_str() {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

// ═══════════════════════════════════════════════════════════
// Time resolution
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

struct Clock {
    hour: u32,
    minute: u32,
    meridiem: Option<Meridiem>,
}

fn parse_clock(value: &str) -> Option<Clock> {
    let caps = PATTERNS.clock.captures(value.trim())?;
    if let Some(word) = caps.name("word") {
        let hour = if word.as_str().eq_ignore_ascii_case("noon") { 12 } else { 0 };
        return Some(Clock {
            hour,
            minute: 0,
            meridiem: None,
        });
    }
    let hour: u32 = caps.name("h")?.as_str().parse().ok()?;
    let minute: u32 = match caps.name("m") {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let meridiem = caps.name("ap").map(|ap| {
        if ap.as_str().eq_ignore_ascii_case("a") {
            Meridiem::Am
        } else {
            Meridiem::Pm
        }
    });
    Some(Clock {
        hour,
        minute,
        meridiem,
    })
}

fn to_time(clock: &Clock, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
    let hour = match meridiem {
        Some(_) if clock.hour == 0 || clock.hour > 12 => return None,
        Some(Meridiem::Am) => clock.hour % 12,
        Some(Meridiem::Pm) => clock.hour % 12 + 12,
        None => clock.hour,
    };
    NaiveTime::from_hms_opt(hour, clock.minute, 0)
}

/// Parse "3pm", "10:30 am", "3-4pm", "2:00 PM - 3:30 PM", "noon".
/// A range start without am/pm inherits the end's meridiem ("3-4pm"),
/// unless that would put it after the end ("11-1pm" reads 11am).
fn parse_time_spec(spec: &str) -> Option<(NaiveTime, Option<NaiveTime>)> {
    let caps = PATTERNS.clock_range.captures(spec.trim())?;
    let first = parse_clock(caps.name("a")?.as_str())?;
    let second = match caps.name("b") {
        Some(b) => Some(parse_clock(b.as_str())?),
        None => None,
    };

    let Some(second) = second else {
        let is_clock_time = first.meridiem.is_some()
            || spec.contains(':')
            || spec.to_ascii_lowercase().contains("noon")
            || spec.to_ascii_lowercase().contains("midnight");
        if !is_clock_time {
            return None;
        }
        return Some((to_time(&first, first.meridiem)?, None));
    };

    let end = to_time(&second, second.meridiem)?;
    let start = match (first.meridiem, second.meridiem) {
        (Some(m), _) => to_time(&first, Some(m))?,
        (None, Some(m)) => {
            let inherited = to_time(&first, Some(m));
            match inherited {
                Some(t) if t <= end => t,
                _ => to_time(&first, Some(Meridiem::Am)).or_else(|| to_time(&first, None))?,
            }
        }
        (None, None) => to_time(&first, None)?,
    };
    Some((start, Some(end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TORONTO: Tz = chrono_tz::America::Toronto;

    /// Friday 2025-08-01 09:00 in Toronto.
    fn reference() -> DateTime<Tz> {
        TORONTO.with_ymd_and_hms(2025, 8, 1, 9, 0, 0).unwrap()
    }

    fn recognize(text: &str) -> Vec<DateHit> {
        parse_dates(&PhraseRecognizer::new(), text, reference())
    }

    #[test]
    fn iso_timestamp_with_zulu() {
        let hits = recognize("Deploy window 2025-08-29T17:00:00Z sharp");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_iso, "2025-08-29T17:00:00Z");
        assert_eq!(hits[0].offset, 14);
        assert!(!hits[0].all_day);
    }

    #[test]
    fn iso_date_is_all_day() {
        let hits = recognize("Due 2025-09-15");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_iso, "2025-09-15T00:00:00-04:00");
        assert!(hits[0].all_day);
    }

    #[test]
    fn month_day_with_time_range() {
        let hits = recognize("Budget review on August 29 from 2:00 PM - 3:30 PM");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_iso, "2025-08-29T14:00:00-04:00");
        assert_eq!(hits[0].end_iso.as_deref(), Some("2025-08-29T15:30:00-04:00"));
        assert_eq!(hits[0].text, "August 29 from 2:00 PM - 3:30 PM");
    }

    #[test]
    fn weekday_prefix_is_part_of_phrase() {
        let hits = recognize("Call: Friday, August 29 at 3pm");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].offset, 6);
        assert_eq!(hits[0].start_iso, "2025-08-29T15:00:00-04:00");
    }

    #[test]
    fn past_month_day_rolls_to_next_year() {
        let hits = recognize("Party March 3 at 7pm");
        assert_eq!(hits[0].start_iso, "2026-03-03T19:00:00-05:00");
    }

    #[test]
    fn explicit_year_is_kept() {
        let hits = recognize("Filed on 3 March 2024");
        assert_eq!(hits[0].start_iso, "2024-03-03T00:00:00-05:00");
        assert!(hits[0].all_day);
    }

    #[test]
    fn inherited_meridiem_in_short_range() {
        let hits = recognize("Workshop tomorrow 3-4pm");
        assert_eq!(hits[0].start_iso, "2025-08-02T15:00:00-04:00");
        assert_eq!(hits[0].end_iso.as_deref(), Some("2025-08-02T16:00:00-04:00"));
    }

    #[test]
    fn next_weekday_skips_today() {
        // Reference is a Friday.
        let hits = recognize("next friday at 10am");
        assert_eq!(hits[0].start_iso, "2025-08-08T10:00:00-04:00");
        let hits = recognize("friday at 10am");
        assert_eq!(hits[0].start_iso, "2025-08-01T10:00:00-04:00");
        let hits = recognize("monday at 10am");
        assert_eq!(hits[0].start_iso, "2025-08-04T10:00:00-04:00");
    }

    #[test]
    fn time_before_date() {
        let hits = recognize("Dentist at 4:15 pm on Tuesday");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_iso, "2025-08-05T16:15:00-04:00");
    }

    #[test]
    fn tonight_defaults_to_evening() {
        let hits = recognize("Dinner tonight");
        assert_eq!(hits[0].start_iso, "2025-08-01T20:00:00-04:00");
        assert!(!hits[0].all_day);
    }

    #[test]
    fn bare_time_in_the_past_rolls_forward() {
        let hits = recognize("Ping me at 8am");
        assert_eq!(hits[0].start_iso, "2025-08-02T08:00:00-04:00");
        let hits = recognize("Ping me at noon");
        assert_eq!(hits[0].start_iso, "2025-08-01T12:00:00-04:00");
    }

    #[test]
    fn numeric_us_date() {
        let hits = recognize("Offsite 9/12 at 9:30");
        assert_eq!(hits[0].start_iso, "2025-09-12T09:30:00-04:00");
    }

    #[test]
    fn multiple_hits_in_order() {
        let text = "Kickoff\nAugust 20 at 10am\nRetro\nAugust 27 at 4pm";
        let hits = recognize(text);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].offset < hits[1].offset);
        assert_eq!(&text[hits[1].offset..hits[1].offset + 9], "August 27");
    }

    #[test]
    fn plain_numbers_are_not_times() {
        assert!(recognize("We sold 300 units across 12 stores").is_empty());
    }

    #[test]
    fn invalid_calendar_date_is_skipped() {
        assert!(recognize("February 30 at 3pm").is_empty());
    }

    #[test]
    fn weekday_resolution_without_forward_bias_looks_back() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let date = resolve_weekday(today, Weekday::Mon, false, false);
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 7, 28).unwrap());
    }

    #[test]
    fn time_spec_variants() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(parse_time_spec("3pm"), Some((t(15, 0), None)));
        assert_eq!(parse_time_spec("10:30 a.m."), Some((t(10, 30), None)));
        assert_eq!(parse_time_spec("12am"), Some((t(0, 0), None)));
        assert_eq!(parse_time_spec("14:45"), Some((t(14, 45), None)));
        assert_eq!(parse_time_spec("11-1pm"), Some((t(11, 0), Some(t(13, 0)))));
        assert_eq!(parse_time_spec("9am to 5pm"), Some((t(9, 0), Some(t(17, 0)))));
        assert_eq!(parse_time_spec("13pm"), None);
    }
}
