use super::types::Event;

/// Confidence given to model events that declare none.
pub const LLM_DEFAULT_CONFIDENCE: f64 = 0.6;

/// Threshold the prompt asks the model to self-censor below.
pub const PROMPT_CONFIDENCE_GATE: f64 = 0.6;

/// Drop events below `floor`. Returns the survivors and how many were dropped.
///
/// The model is only *asked* to gate on confidence; this is the
/// server-side check, enabled through `ExtractorConfig::min_confidence`.
pub fn apply_confidence_floor(events: Vec<Event>, floor: f64) -> (Vec<Event>, usize) {
    let before = events.len();
    let kept: Vec<Event> = events.into_iter().filter(|e| e.confidence >= floor).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
