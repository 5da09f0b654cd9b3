//! Extraction service: the narrow entry point an outer transport calls.
//!
//! Wraps the selection policy and the per-caller result cache. The caller
//! key is opaque here (an outer HTTP layer would pass a client address).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::ExtractorConfig;
use crate::pipeline::events::{
    ExtractionError, ExtractionRequest, ExtractionResult, LlmClient, LlmExtractor, OllamaClient,
    RuleExtractor, SelectionPolicy,
};
use crate::result_cache::{CachedResult, ResultCache};

pub struct ExtractionService {
    policy: SelectionPolicy,
    llm: Arc<LlmExtractor>,
    rules: RuleExtractor,
    default_timezone: String,
    cache: Mutex<ResultCache>,
}

impl ExtractionService {
    /// Build a service talking to the Ollama server named in `config`.
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        let client = OllamaClient::new(&config.ollama_url)?.with_api_key(config.api_key.clone());
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Build a service around any text-generation client.
    pub fn with_client(config: &ExtractorConfig, client: Arc<dyn LlmClient>) -> Self {
        let llm = Arc::new(
            LlmExtractor::new(client, config.model.clone())
                .with_budget_ms(config.budget_ms)
                .with_max_output_tokens(config.max_output_tokens)
                .with_min_confidence(config.min_confidence),
        );
        let rules = RuleExtractor::default();
        let policy =
            SelectionPolicy::new(llm.clone(), rules.clone()).with_budget_ms(config.smart_budget_ms);
        let cache = ResultCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        );

        Self {
            policy,
            llm,
            rules,
            default_timezone: config.timezone.clone(),
            cache: Mutex::new(cache),
        }
    }

    /// Run the selection policy and remember the result for `caller`.
    pub async fn extract(&self, caller: &str, request: ExtractionRequest) -> ExtractionResult {
        let request = self.with_default_timezone(request);
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("extract", %request_id, caller = %caller);

        async {
            tracing::info!(
                text_chars = request.trimmed_text().chars().count(),
                timezone = %request.timezone,
                "Extraction request"
            );
            let result = self.policy.extract_smart(&request).await;
            tracing::info!(
                events = result.events.len(),
                degraded = result.degraded,
                warnings = ?result.warning_codes(),
                "Extraction finished"
            );
            self.remember(caller, &result);
            result
        }
        .instrument(span)
        .await
    }

    /// LLM path only, under the configured direct budget.
    pub async fn extract_llm(&self, caller: &str, request: ExtractionRequest) -> ExtractionResult {
        let request = self.with_default_timezone(request);
        let span = tracing::info_span!("extract_llm", request_id = %Uuid::new_v4(), caller = %caller);
        let result = self.llm.extract(&request).instrument(span).await;
        self.remember(caller, &result);
        result
    }

    /// Rule path only. Never touches the model.
    pub fn extract_rules(&self, caller: &str, request: ExtractionRequest) -> ExtractionResult {
        let request = self.with_default_timezone(request);
        let span = tracing::info_span!("extract_rules", request_id = %Uuid::new_v4(), caller = %caller);
        let _guard = span.enter();
        let result = self.rules.extract(&request);
        self.remember(caller, &result);
        result
    }

    /// Latest result stored for `caller`, if still fresh.
    pub fn latest(&self, caller: &str) -> Option<CachedResult> {
        match self.cache.lock() {
            Ok(mut cache) => cache.get(caller),
            Err(_) => {
                tracing::warn!("Result cache lock poisoned");
                None
            }
        }
    }

    fn remember(&self, caller: &str, result: &ExtractionResult) {
        match self.cache.lock() {
            Ok(mut cache) => cache.insert(caller, result.clone()),
            Err(_) => tracing::warn!("Result cache lock poisoned, result not cached"),
        }
    }

    fn with_default_timezone(&self, mut request: ExtractionRequest) -> ExtractionRequest {
        if request.timezone.trim().is_empty() {
            request.timezone = self.default_timezone.clone();
        }
        request
    }
}
