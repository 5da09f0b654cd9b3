use std::sync::Arc;

use super::llm::LlmExtractor;
use super::rules::RuleExtractor;
use super::types::{
    ExtractionPath, ExtractionRequest, ExtractionResult, ExtractionWarning, ResultMeta,
    WarningCode,
};
use crate::config;

/// LLM first, rules as fallback.
///
/// The model gets one call under `budget_ms`. When it degrades or finds
/// nothing, the rule path runs and its result is returned as-is. When
/// both come back empty the result is degraded with `NO_RETURN_EVENT`.
pub struct SelectionPolicy {
    llm: Arc<LlmExtractor>,
    rules: RuleExtractor,
    budget_ms: u64,
}

impl SelectionPolicy {
    pub fn new(llm: Arc<LlmExtractor>, rules: RuleExtractor) -> Self {
        Self {
            llm,
            rules,
            budget_ms: config::DEFAULT_SMART_BUDGET_MS,
        }
    }

    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.budget_ms = budget_ms;
        self
    }

    pub async fn extract_smart(&self, request: &ExtractionRequest) -> ExtractionResult {
        // Nothing to send to the model.
        if request.trimmed_text().is_empty() {
            return self.rules.extract(request);
        }

        let mut llm_request = request.clone();
        llm_request.budget_ms = Some(self.budget_ms);
        let llm_result = self.llm.extract(&llm_request).await;

        if !llm_result.degraded && !llm_result.events.is_empty() {
            return llm_result;
        }

        let rules_result = self.rules.extract(request);
        if !rules_result.events.is_empty() {
            tracing::info!(
                llm_degraded = llm_result.degraded,
                llm_warnings = ?llm_result.warning_codes(),
                events = rules_result.events.len(),
                "Falling back to rule extraction"
            );
            return rules_result;
        }

        tracing::info!(
            llm_degraded = llm_result.degraded,
            llm_warnings = ?llm_result.warning_codes(),
            "Neither path produced events"
        );

        let mut warnings = llm_result.warnings;
        warnings.extend(rules_result.warnings);
        warnings.push(ExtractionWarning::new(
            WarningCode::NoReturnEvent,
            "No events were found in the text",
        ));

        ExtractionResult {
            events: Vec::new(),
            degraded: true,
            warnings,
            meta: Some(ResultMeta::path(ExtractionPath::None)),
        }
    }
}
