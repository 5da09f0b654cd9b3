use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ExtractionError;
use crate::config;

/// Title used when neither path can derive one.
pub const PLACEHOLDER_TITLE: &str = "Untitled event";

/// Titles longer than this are cut (characters, not bytes).
pub const MAX_TITLE_CHARS: usize = 200;

// ═══════════════════════════════════════════════════════════
// Event
// ═══════════════════════════════════════════════════════════

/// Which extraction path produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Rules,
    Llm,
}

/// Canonical output unit of both extraction paths.
///
/// Constructed once per request and never mutated after sanitization.
/// Invariant: when `end` is present it is not earlier than `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub title: String,
    /// ISO-8601 timestamp; the only mandatory temporal field.
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    /// IANA zone carried from the request, never derived from the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub source: EventSource,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Warnings
// ═══════════════════════════════════════════════════════════

/// Fixed set of advisory warning codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    EmptyText,
    LlmBadJson,
    LlmTimeout,
    LlmError,
    LlmOk,
    LowConfidence,
    AmbiguousTime,
    NoActionableIntent,
    NoReturnEvent,
    ModelNote,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::EmptyText => "EMPTY_TEXT",
            WarningCode::LlmBadJson => "LLM_BAD_JSON",
            WarningCode::LlmTimeout => "LLM_TIMEOUT",
            WarningCode::LlmError => "LLM_ERROR",
            WarningCode::LlmOk => "LLM_OK",
            WarningCode::LowConfidence => "LOW_CONFIDENCE",
            WarningCode::AmbiguousTime => "AMBIGUOUS_TIME",
            WarningCode::NoActionableIntent => "NO_ACTIONABLE_INTENT",
            WarningCode::NoReturnEvent => "NO_RETURN_EVENT",
            WarningCode::ModelNote => "MODEL_NOTE",
        }
    }
}

/// Non-fatal, per-request note attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub code: WarningCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl ExtractionWarning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn empty_text() -> Self {
        Self::new(WarningCode::EmptyText, "No text to extract events from")
    }
}

// ═══════════════════════════════════════════════════════════
// Result envelope
// ═══════════════════════════════════════════════════════════

/// Which path produced the envelope that was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionPath {
    Rules,
    Llm,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    pub path: ExtractionPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_ms: Option<u64>,
}

impl ResultMeta {
    pub fn path(path: ExtractionPath) -> Self {
        Self {
            path,
            model: None,
            budget_ms: None,
        }
    }
}

/// Response envelope shared by every extraction operation.
///
/// `degraded` marks anything other than the happy path: an error with no
/// usable events, or an empty result from a path expected to find some.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub events: Vec<Event>,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ExtractionWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResultMeta>,
}

impl ExtractionResult {
    /// Empty result carrying a single warning.
    pub fn empty(degraded: bool, warning: ExtractionWarning) -> Self {
        Self {
            events: Vec::new(),
            degraded,
            warnings: vec![warning],
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: ResultMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    pub fn warning_codes(&self) -> Vec<WarningCode> {
        self.warnings.iter().map(|w| w.code).collect()
    }
}

// ═══════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════

fn default_timezone() -> String {
    config::DEFAULT_TIMEZONE.to_string()
}

/// Core-facing extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Reserved for the upload layer; ignored by extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Anchor for relative phrases. Defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for ExtractionRequest {
    fn default() -> Self {
        Self {
            text: None,
            file_id: None,
            timezone: default_timezone(),
            reference_date: None,
            budget_ms: None,
            model: None,
        }
    }
}

impl ExtractionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_reference_date(mut self, reference: impl Into<String>) -> Self {
        self.reference_date = Some(reference.into());
        self
    }

    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.budget_ms = Some(budget_ms);
        self
    }

    /// Trimmed text, empty when absent.
    pub fn trimmed_text(&self) -> &str {
        self.text.as_deref().map(str::trim).unwrap_or("")
    }
}

// ═══════════════════════════════════════════════════════════
// Text generation capability
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub options: GenerationOptions,
}

/// Text-generation backend abstraction (allows mocking).
///
/// Implementations should stop work and return `ExtractionError::Cancelled`
/// once `cancel` fires; callers also race the token themselves.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<String, ExtractionError>;
}
