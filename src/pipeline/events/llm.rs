//! LLM-based extraction: a single budgeted model call.
//!
//! Every failure (bad JSON, schema violation, timeout, transport error)
//! converges to `degraded: true` with no events and one warning.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::budget::{clamp_budget, BudgetTimer};
use super::confidence::apply_confidence_floor;
use super::dedup::dedupe_events;
use super::normalize::normalize;
use super::parser::{extract_json_block, validate_payload, ModelPayload};
use super::prompt::build_extraction_prompt;
use super::sanitize::sanitize_candidate;
use super::timestamp::{resolve_reference, resolve_timezone};
use super::types::{
    Event, ExtractionPath, ExtractionRequest, ExtractionResult, ExtractionWarning,
    GenerationOptions, GenerationRequest, LlmClient, ResultMeta, WarningCode,
};
use super::ExtractionError;
use crate::config;

/// Deterministic sampling for extraction.
const EXTRACTION_TEMPERATURE: f32 = 0.0;

pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
    model: String,
    default_budget_ms: u64,
    max_output_tokens: u32,
    min_confidence: Option<f64>,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            default_budget_ms: config::DEFAULT_BUDGET_MS,
            max_output_tokens: config::DEFAULT_MAX_OUTPUT_TOKENS,
            min_confidence: None,
        }
    }

    /// Budget used when the request carries none (still clamped).
    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.default_budget_ms = budget_ms;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Drop events whose confidence is below `floor`.
    pub fn with_min_confidence(mut self, floor: Option<f64>) -> Self {
        self.min_confidence = floor;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionResult {
        let model = request
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.model)
            .to_string();
        let budget = clamp_budget(request.budget_ms, self.default_budget_ms);
        let budget_ms = budget.as_millis() as u64;
        let meta = ResultMeta {
            path: ExtractionPath::Llm,
            model: Some(model.clone()),
            budget_ms: Some(budget_ms),
        };

        if request.trimmed_text().is_empty() {
            tracing::warn!("LLM extraction called with empty text");
            return ExtractionResult::empty(true, ExtractionWarning::empty_text()).with_meta(meta);
        }

        let text = normalize(request.text.as_deref().unwrap_or(""));
        let tz = resolve_timezone(&request.timezone);
        let reference = resolve_reference(request.reference_date.as_deref(), tz);

        let generation = GenerationRequest {
            prompt: build_extraction_prompt(&text, &request.timezone, reference),
            model: model.clone(),
            options: GenerationOptions {
                temperature: EXTRACTION_TEMPERATURE,
                max_output_tokens: self.max_output_tokens,
            },
        };

        tracing::debug!(
            model = %model,
            budget_ms,
            text_chars = text.chars().count(),
            "Invoking LLM"
        );

        let started = Instant::now();
        let raw = {
            let cancel = CancellationToken::new();
            let _timer = BudgetTimer::start(budget, cancel.clone());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ExtractionError::Cancelled),
                result = self.client.generate(&generation, cancel.clone()) => result,
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                let warning = failure_warning(&e, budget_ms, elapsed_ms);
                tracing::warn!(
                    model = %model,
                    budget_ms,
                    elapsed_ms,
                    code = warning.code.as_str(),
                    error = %e,
                    "LLM extraction failed"
                );
                return ExtractionResult::empty(true, warning).with_meta(meta);
            }
        };

        let payload = match validate_payload(extract_json_block(&raw)) {
            ModelPayload::Valid(payload) => payload,
            ModelPayload::Rejected(reason) => {
                tracing::warn!(
                    model = %model,
                    elapsed_ms,
                    response_chars = raw.chars().count(),
                    reason = %reason,
                    "LLM response rejected"
                );
                let warning = ExtractionWarning::new(
                    WarningCode::LlmBadJson,
                    "Model response was not valid event JSON",
                );
                return ExtractionResult::empty(true, warning).with_meta(meta);
            }
        };

        let candidates = payload.events.len();
        let events: Vec<Event> = payload
            .events
            .into_iter()
            .filter_map(|candidate| sanitize_candidate(candidate, &request.timezone, tz))
            .collect();
        let sanitized_out = candidates - events.len();

        let (events, duplicates) = dedupe_events(events, tz);

        let mut warnings = vec![ExtractionWarning::new(
            WarningCode::LlmOk,
            "Events extracted by the language model",
        )
        .with_context(json!({ "elapsedMs": elapsed_ms }))];
        warnings.extend(payload.warnings.iter().map(|w| model_warning(w)));

        let events = match self.min_confidence {
            Some(floor) => {
                let (kept, dropped) = apply_confidence_floor(events, floor);
                if dropped > 0 {
                    warnings.push(
                        ExtractionWarning::new(
                            WarningCode::LowConfidence,
                            format!("{dropped} event(s) below the confidence floor were dropped"),
                        )
                        .with_context(json!({ "floor": floor, "dropped": dropped })),
                    );
                }
                kept
            }
            None => events,
        };

        tracing::info!(
            model = %model,
            elapsed_ms,
            candidates,
            sanitized_out,
            duplicates,
            events = events.len(),
            "LLM extraction complete"
        );

        ExtractionResult {
            events,
            degraded: false,
            warnings,
            meta: Some(meta),
        }
    }
}

/// Map a call failure to its warning. Only cancellation is a timeout.
fn failure_warning(error: &ExtractionError, budget_ms: u64, elapsed_ms: u64) -> ExtractionWarning {
    if error.is_cancellation() {
        ExtractionWarning::new(
            WarningCode::LlmTimeout,
            format!("Language model did not answer within {budget_ms} ms"),
        )
        .with_context(json!({ "budgetMs": budget_ms, "elapsedMs": elapsed_ms }))
    } else {
        let kind = match error {
            ExtractionError::Unauthorized(_) => "unauthorized",
            ExtractionError::LlmConnection(_) => "connection",
            ExtractionError::LlmStatus { .. } => "status",
            _ => "other",
        };
        ExtractionWarning::new(WarningCode::LlmError, "Language model call failed")
            .with_context(json!({ "message": error.to_string(), "kind": kind }))
    }
}

/// Classify a free-text warning from the model by keyword.
pub fn classify_model_warning(message: &str) -> WarningCode {
    let lower = message.to_lowercase();
    if lower.contains("confiden") {
        WarningCode::LowConfidence
    } else if lower.contains("ambiguous") || lower.contains("unclear") || lower.contains("time zone")
    {
        WarningCode::AmbiguousTime
    } else if lower.contains("no event")
        || lower.contains("no actionable")
        || lower.contains("nothing to schedule")
        || lower.contains("no scheduling")
    {
        WarningCode::NoActionableIntent
    } else {
        WarningCode::ModelNote
    }
}

fn model_warning(message: &str) -> ExtractionWarning {
    ExtractionWarning::new(classify_model_warning(message), message.trim())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pipeline::events::ollama::{MockLlmClient, MockReply};
    use crate::pipeline::events::types::EventSource;

    fn extractor(mock: MockLlmClient) -> (Arc<MockLlmClient>, LlmExtractor) {
        let mock = Arc::new(mock);
        let extractor = LlmExtractor::new(mock.clone(), "test-model");
        (mock, extractor)
    }

    fn request(text: &str) -> ExtractionRequest {
        ExtractionRequest::new(text).with_reference_date("2025-08-01T09:00:00-04:00")
    }

    #[tokio::test]
    async fn empty_text_is_degraded_without_calling_model() {
        let (mock, extractor) = extractor(MockLlmClient::new("{}"));
        let result = extractor.extract(&request("   ")).await;
        assert!(result.events.is_empty());
        assert!(result.degraded);
        assert_eq!(result.warning_codes(), vec![WarningCode::EmptyText]);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn invalid_json_is_bad_json() {
        let (_, extractor) = extractor(MockLlmClient::new("Sorry, I can't help with that."));
        let result = extractor.extract(&request("Lunch Friday")).await;
        assert!(result.degraded);
        assert!(result.events.is_empty());
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmBadJson]);
    }

    #[tokio::test]
    async fn schema_violation_rejects_whole_payload() {
        let raw = r#"{"events":[{"title":"Sync","start":"2025-08-29T15:00:00-04:00"},{"title":""}]}"#;
        let (_, extractor) = extractor(MockLlmClient::new(raw));
        let result = extractor.extract(&request("Sync Friday")).await;
        assert!(result.degraded);
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmBadJson]);
    }

    #[tokio::test]
    async fn empty_title_without_start_is_bad_json() {
        let (_, extractor) = extractor(MockLlmClient::new(r#"{"events":[{"title":""}]}"#));
        let result = extractor.extract(&request("Sync sometime")).await;
        assert!(result.degraded);
        assert!(result.events.is_empty());
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmBadJson]);
    }

    #[tokio::test]
    async fn missing_start_is_not_bad_json() {
        let (_, extractor) = extractor(MockLlmClient::new(r#"{"events":[{"title":"Sync"}]}"#));
        let result = extractor.extract(&request("Sync sometime")).await;
        assert!(!result.degraded);
        assert!(result.events.is_empty());
        assert!(!result.has_warning(WarningCode::LlmBadJson));
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmOk]);
    }

    #[tokio::test]
    async fn fenced_response_is_sanitized_into_events() {
        let raw = "```json\n{\"events\":[{\"title\":\"  Design review \",\"start\":\"2025-08-29T15:00:00-04:00\",\"end\":\"2025-08-29T14:00:00-04:00\"}],\"warnings\":[]}\n```";
        let (mock, extractor) = extractor(MockLlmClient::new(raw));
        let result = extractor
            .extract(&request("Design review Aug 29 at 3pm").with_timezone("America/Toronto"))
            .await;

        assert!(!result.degraded);
        assert_eq!(result.events.len(), 1);
        let event = &result.events[0];
        assert_eq!(event.title, "Design review");
        assert!(event.end.is_none());
        assert_eq!(event.confidence, 0.6);
        assert_eq!(event.source, EventSource::Llm);
        assert_eq!(event.timezone.as_deref(), Some("America/Toronto"));
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmOk]);

        let sent = mock.requests().pop().unwrap();
        assert_eq!(sent.model, "test-model");
        assert_eq!(sent.options.temperature, 0.0);
        assert!(sent.prompt.contains("Design review Aug 29 at 3pm"));
    }

    #[tokio::test]
    async fn model_warnings_follow_llm_ok() {
        let raw = r#"{"events":[],"warnings":["Low confidence about the lunch invite","The time is ambiguous"]}"#;
        let (_, extractor) = extractor(MockLlmClient::new(raw));
        let result = extractor.extract(&request("maybe lunch?")).await;
        assert_eq!(
            result.warning_codes(),
            vec![
                WarningCode::LlmOk,
                WarningCode::LowConfidence,
                WarningCode::AmbiguousTime
            ]
        );
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let mock = MockLlmClient::new("{}").with_delay(Duration::from_secs(10));
        let (_, extractor) = extractor(mock);
        let result = extractor
            .extract(&request("Standup tomorrow 9am").with_budget_ms(1))
            .await;

        assert!(result.degraded);
        assert!(result.events.is_empty());
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmTimeout]);
        let context = result.warnings[0].context.as_ref().unwrap();
        assert_eq!(context["budgetMs"], 1_000);
        assert!(context["elapsedMs"].as_u64().unwrap() >= 1_000);
        assert_eq!(result.meta.unwrap().budget_ms, Some(1_000));
    }

    #[tokio::test]
    async fn transport_error_is_llm_error() {
        let (_, extractor) = extractor(MockLlmClient::with_reply(MockReply::Connection));
        let result = extractor.extract(&request("Call Bob Monday")).await;
        assert!(result.degraded);
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmError]);
        let context = result.warnings[0].context.as_ref().unwrap();
        assert_eq!(context["kind"], "connection");
        assert!(context["message"].as_str().unwrap().contains("not reachable"));
    }

    #[tokio::test]
    async fn unauthorized_maps_by_kind() {
        let (_, extractor) = extractor(MockLlmClient::with_reply(MockReply::Unauthorized));
        let result = extractor.extract(&request("Call Bob Monday")).await;
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmError]);
        assert_eq!(result.warnings[0].context.as_ref().unwrap()["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn server_status_maps_by_kind() {
        let (_, extractor) = extractor(MockLlmClient::with_reply(MockReply::Status(
            503,
            "model loading".into(),
        )));
        let result = extractor.extract(&request("Call Bob Monday")).await;
        assert!(result.degraded);
        assert_eq!(result.warning_codes(), vec![WarningCode::LlmError]);
        let context = result.warnings[0].context.as_ref().unwrap();
        assert_eq!(context["kind"], "status");
        assert!(context["message"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn duplicates_and_low_confidence_are_removed() {
        let raw = r#"{"events":[
            {"title":"Standup","start":"2025-08-04T09:00:00-04:00","confidence":0.9},
            {"title":"standup","start":"2025-08-04T09:05:00-04:00","confidence":0.9},
            {"title":"Maybe drinks","start":"2025-08-04T18:00:00-04:00","confidence":0.3}
        ]}"#;
        let (_, extractor) = extractor(MockLlmClient::new(raw));
        let extractor = extractor.with_min_confidence(Some(0.5));
        let result = extractor.extract(&request("Standup Monday 9am, maybe drinks")).await;

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].title, "Standup");
        assert_eq!(
            result.warning_codes(),
            vec![WarningCode::LlmOk, WarningCode::LowConfidence]
        );
    }

    #[tokio::test]
    async fn request_model_overrides_default() {
        let (mock, extractor) = extractor(MockLlmClient::new(r#"{"events":[]}"#));
        let mut req = request("Lunch");
        req.model = Some("other-model".into());
        let result = extractor.extract(&req).await;
        assert_eq!(mock.requests()[0].model, "other-model");
        assert_eq!(result.meta.unwrap().model.as_deref(), Some("other-model"));
    }

    #[test]
    fn classifies_model_warnings() {
        assert_eq!(classify_model_warning("low confidence"), WarningCode::LowConfidence);
        assert_eq!(classify_model_warning("Time is unclear"), WarningCode::AmbiguousTime);
        assert_eq!(classify_model_warning("No event found"), WarningCode::NoActionableIntent);
        assert_eq!(classify_model_warning("Newsletter skipped"), WarningCode::ModelNote);
    }
}
