//! Near-duplicate removal for model output.
//!
//! Two events are duplicates when their titles normalize to the same key
//! and their starts are within `DEDUP_WINDOW_MINUTES`. The first one wins.

use chrono::Duration;
use chrono_tz::Tz;

use super::timestamp::parse_timestamp;
use super::types::Event;

pub const DEDUP_WINDOW_MINUTES: i64 = 15;

/// Lowercased alphanumeric words, single-spaced.
pub fn title_key(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the deduplicated events and how many were removed.
pub fn dedupe_events(events: Vec<Event>, tz: Tz) -> (Vec<Event>, usize) {
    let window = Duration::minutes(DEDUP_WINDOW_MINUTES);
    let mut kept: Vec<(String, Option<chrono::DateTime<chrono::Utc>>, Event)> = Vec::new();
    let mut removed = 0usize;

    for event in events {
        let key = title_key(&event.title);
        let start = parse_timestamp(&event.start, tz);
        let duplicate = kept.iter().any(|(k, s, _)| {
            *k == key
                && match (s, start) {
                    (Some(a), Some(b)) => (*a - b).abs() <= window,
                    _ => false,
                }
        });
        if duplicate {
            removed += 1;
        } else {
            kept.push((key, start, event));
        }
    }

    (kept.into_iter().map(|(_, _, e)| e).collect(), removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::types::EventSource;

    fn event(title: &str, start: &str) -> Event {
        Event {
            title: title.into(),
            start: start.into(),
            end: None,
            all_day: None,
            timezone: None,
            source: EventSource::Llm,
            confidence: 0.8,
            location: None,
            description: None,
            url: None,
        }
    }

    #[test]
    fn title_key_ignores_case_and_punctuation() {
        assert_eq!(title_key("Design Review!"), "design review");
        assert_eq!(title_key("design  -  review"), "design review");
    }

    #[test]
    fn removes_same_title_within_window() {
        let events = vec![
            event("Design review", "2025-08-29T15:00:00Z"),
            event("design review.", "2025-08-29T15:10:00Z"),
        ];
        let (kept, removed) = dedupe_events(events, Tz::UTC);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 1);
        assert_eq!(kept[0].start, "2025-08-29T15:00:00Z");
    }

    #[test]
    fn keeps_same_title_outside_window() {
        let events = vec![
            event("Standup", "2025-08-29T09:00:00Z"),
            event("Standup", "2025-08-30T09:00:00Z"),
        ];
        let (kept, removed) = dedupe_events(events, Tz::UTC);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn keeps_different_titles_at_same_time() {
        let events = vec![
            event("Standup", "2025-08-29T09:00:00Z"),
            event("Dentist", "2025-08-29T09:00:00Z"),
        ];
        let (kept, _) = dedupe_events(events, Tz::UTC);
        assert_eq!(kept.len(), 2);
    }
}
