use std::sync::Arc;

use super::dates::{parse_dates, DateHit, DateRecognizer, PhraseRecognizer};
use super::normalize::normalize;
use super::sanitize::cap_title;
use super::timestamp::{is_parseable, parse_timestamp, resolve_reference, resolve_timezone};
use super::types::{
    Event, EventSource, ExtractionPath, ExtractionRequest, ExtractionResult, ExtractionWarning,
    ResultMeta, PLACEHOLDER_TITLE,
};

/// Fixed confidence for every rule-derived event.
pub const RULES_CONFIDENCE: f64 = 0.75;

/// Leading list markers stripped from derived titles.
const BULLET_CHARS: &[char] = &['-', '*', '•', '·', '◦', '‣', '>', '–', '—'];

/// Deterministic extraction: date phrases + title by proximity.
///
/// Never degraded: it either finds events or it doesn't.
#[derive(Clone)]
pub struct RuleExtractor {
    recognizer: Arc<dyn DateRecognizer>,
}

impl RuleExtractor {
    pub fn new(recognizer: Arc<dyn DateRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn extract(&self, request: &ExtractionRequest) -> ExtractionResult {
        let meta = ResultMeta::path(ExtractionPath::Rules);

        if request.trimmed_text().is_empty() {
            return ExtractionResult::empty(false, ExtractionWarning::empty_text()).with_meta(meta);
        }

        let text = normalize(request.text.as_deref().unwrap_or(""));
        let tz = resolve_timezone(&request.timezone);
        let reference = resolve_reference(request.reference_date.as_deref(), tz);

        let hits = parse_dates(self.recognizer.as_ref(), &text, reference);
        let hit_count = hits.len();

        let events: Vec<Event> = hits
            .into_iter()
            .filter(|hit| hit_is_parseable(hit, tz))
            .map(|hit| event_from_hit(&text, hit, &request.timezone))
            .filter(|event| end_not_before_start(event, tz))
            .collect();

        tracing::debug!(
            hits = hit_count,
            events = events.len(),
            "Rule extraction complete"
        );

        ExtractionResult {
            events,
            degraded: false,
            warnings: Vec::new(),
            meta: Some(meta),
        }
    }
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new(Arc::new(PhraseRecognizer::new()))
    }
}

/// Rule-path extraction with the built-in recognizer.
pub fn extract_rules(request: &ExtractionRequest) -> ExtractionResult {
    RuleExtractor::default().extract(request)
}

fn hit_is_parseable(hit: &DateHit, tz: chrono_tz::Tz) -> bool {
    is_parseable(&hit.start_iso, tz)
        && hit
            .end_iso
            .as_deref()
            .map_or(true, |end| is_parseable(end, tz))
}

fn end_not_before_start(event: &Event, tz: chrono_tz::Tz) -> bool {
    let Some(end) = event.end.as_deref() else {
        return true;
    };
    match (parse_timestamp(&event.start, tz), parse_timestamp(end, tz)) {
        (Some(start), Some(end)) => end >= start,
        _ => false,
    }
}

fn event_from_hit(text: &str, hit: DateHit, timezone: &str) -> Event {
    let title = derive_title(text, hit.offset);
    Event {
        title,
        start: hit.start_iso,
        end: hit.end_iso,
        all_day: hit.all_day.then_some(true),
        timezone: (!timezone.trim().is_empty()).then(|| timezone.to_string()),
        source: EventSource::Rules,
        confidence: RULES_CONFIDENCE,
        location: None,
        description: None,
        url: None,
    }
}

/// Title = the line segment right before the date phrase, bullet-stripped.
pub fn derive_title(text: &str, offset: usize) -> String {
    let end = offset.min(text.len());
    let before = text.get(..end).unwrap_or(text);
    let line = before.rsplit('\n').next().unwrap_or("");

    let title = line
        .trim()
        .trim_start_matches(|c: char| BULLET_CHARS.contains(&c) || c.is_whitespace());

    let title = cap_title(title);
    if title.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        title
    }
}
