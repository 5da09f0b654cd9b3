//! Model output recovery and schema validation.
//!
//! Raw model text goes through `extract_json_block` and then
//! `validate_payload`, which yields a tagged `ModelPayload`. Nothing
//! untyped leaves this module.

use serde::Deserialize;

/// Candidate event as declared by the model, before sanitization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CandidateEvent {
    pub title: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, rename = "allDay")]
    pub all_day: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Whole model payload: `{events:[...], warnings:[...]}`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub events: Vec<CandidateEvent>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Outcome of validating model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelPayload {
    Valid(RawPayload),
    /// The whole response is rejected; the reason is for logs only.
    Rejected(String),
}

impl ModelPayload {
    pub fn is_valid(&self) -> bool {
        matches!(self, ModelPayload::Valid(_))
    }
}

// ═══════════════════════════════════════════════════════════
// JSON block recovery
// ═══════════════════════════════════════════════════════════

/// Pull the JSON object out of a model response.
///
/// Order: bare object, fenced block, first `{` to last `}` (only if it
/// parses), then the trimmed response as-is.
pub fn extract_json_block(response: &str) -> &str {
    let trimmed = response.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed;
    }

    if let Some(block) = fenced_block(trimmed) {
        return block;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let candidate = &trimmed[start..=end];
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return candidate;
            }
        }
    }

    trimmed
}

/// Contents of the first ``` fence, minus an optional language tag.
///
/// The tag may end in a newline or a space. A body that is not an object
/// is not accepted.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let close = after_fence.find("```")?;
    let inner = after_fence[..close].trim_start();

    // ```json {...}  or  ```json\n{...}
    let tag_len = inner
        .find(|c: char| !is_language_tag_char(c))
        .unwrap_or(inner.len());
    let body = inner[tag_len..].trim();
    body.starts_with('{').then_some(body)
}

fn is_language_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

// ═══════════════════════════════════════════════════════════
// Schema validation
// ═══════════════════════════════════════════════════════════

/// Parse and validate. Any violation rejects the whole payload.
pub fn validate_payload(json: &str) -> ModelPayload {
    let value: serde_json::Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => return ModelPayload::Rejected(format!("invalid JSON: {e}")),
    };

    // serde would accept a positional array for a struct
    if !value.is_object() {
        return ModelPayload::Rejected("payload is not a JSON object".into());
    }

    let payload: RawPayload = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(e) => return ModelPayload::Rejected(format!("schema mismatch: {e}")),
    };

    for (index, event) in payload.events.iter().enumerate() {
        if let Err(reason) = check_candidate(event) {
            return ModelPayload::Rejected(format!("events[{index}]: {reason}"));
        }
    }

    ModelPayload::Valid(payload)
}

fn check_candidate(event: &CandidateEvent) -> Result<(), &'static str> {
    if event.title.is_empty() {
        return Err("title must be non-empty");
    }
    if event.start.as_deref().is_some_and(str::is_empty) {
        return Err("start must be a non-empty string or absent");
    }
    if event.end.as_deref().is_some_and(str::is_empty) {
        return Err("end must be a non-empty string or absent");
    }
    if let Some(confidence) = event.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err("confidence must be within [0, 1]");
        }
    }
    Ok(())
}
