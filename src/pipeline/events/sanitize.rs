// Sanitization on both sides of the model call.
// Inbound: strip invisible characters and bound the text before prompting.
// Outbound: turn schema-valid candidates into trustworthy `Event`s or drop them.

use std::sync::LazyLock;

use chrono_tz::Tz;
use regex::Regex;

use super::confidence::LLM_DEFAULT_CONFIDENCE;
use super::parser::CandidateEvent;
use super::timestamp::parse_timestamp;
use super::types::{Event, EventSource, MAX_TITLE_CHARS, PLACEHOLDER_TITLE};

/// Maximum input length sent to the model (characters).
pub const MAX_PROMPT_INPUT_CHARS: usize = 20_000;

// ═══════════════════════════════════════════════════════════
// Inbound
// ═══════════════════════════════════════════════════════════

/// Prepare text for the prompt: drop invisible/control characters, strip
/// the `<message>` delimiter tags and truncate to `MAX_PROMPT_INPUT_CHARS`.
pub fn sanitize_for_prompt(text: &str) -> String {
    let cleaned = strip_delimiter_tags(&remove_invisible_chars(text));
    let truncated = truncate_chars(&cleaned, MAX_PROMPT_INPUT_CHARS);
    if truncated.len() < cleaned.len() {
        tracing::debug!(
            original_chars = cleaned.chars().count(),
            kept_chars = MAX_PROMPT_INPUT_CHARS,
            "Prompt input truncated"
        );
    }
    truncated.to_string()
}

/// Remove zero-width, bidi-override and C0/C1 control characters.
/// Keeps newline and space.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if *c == ' ' || *c == '\n' {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'
                    | '\u{200C}'
                    | '\u{200D}'
                    | '\u{200E}'
                    | '\u{200F}'
                    | '\u{202A}'
                    | '\u{202B}'
                    | '\u{202C}'
                    | '\u{202D}'
                    | '\u{202E}'
                    | '\u{2060}'
                    | '\u{2061}'
                    | '\u{2062}'
                    | '\u{2063}'
                    | '\u{2064}'
                    | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

static DELIMITER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?\s*message\s*>").expect("valid delimiter pattern"));

/// Input must not be able to close the `<message>` block early.
fn strip_delimiter_tags(text: &str) -> String {
    DELIMITER_TAG.replace_all(text, "").into_owned()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Trim and cap a title at `MAX_TITLE_CHARS`. May return an empty string.
pub fn cap_title(title: &str) -> String {
    truncate_chars(title.trim(), MAX_TITLE_CHARS).trim_end().to_string()
}

// ═══════════════════════════════════════════════════════════
// Outbound
// ═══════════════════════════════════════════════════════════

/// Turn a schema-valid candidate into an `Event`, or drop it.
///
/// - missing/unparseable `start` drops the candidate
/// - unparseable or inverted `end` is cleared, never swapped or clamped
/// - absent `confidence` becomes `LLM_DEFAULT_CONFIDENCE`
/// - `timezone` is the caller's, verbatim
pub fn sanitize_candidate(candidate: CandidateEvent, timezone: &str, tz: Tz) -> Option<Event> {
    let start = candidate.start.as_deref().map(str::trim).unwrap_or("");
    if start.is_empty() {
        return None;
    }
    let start_instant = parse_timestamp(start, tz)?;

    let end = candidate
        .end
        .as_deref()
        .map(str::trim)
        .filter(|end| !end.is_empty())
        .filter(|end| parse_timestamp(end, tz).is_some_and(|e| e >= start_instant))
        .map(str::to_string);

    let confidence = candidate
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(LLM_DEFAULT_CONFIDENCE);

    let title = cap_title(&candidate.title);
    let title = if title.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        title
    };

    Some(Event {
        title,
        start: start.to_string(),
        end,
        all_day: candidate.all_day,
        timezone: (!timezone.trim().is_empty()).then(|| timezone.to_string()),
        source: EventSource::Llm,
        confidence,
        location: non_empty(candidate.location),
        description: non_empty(candidate.description),
        url: non_empty(candidate.url),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
