use serde::Serialize;

use crate::pipeline::events::timestamp::parse_timezone;
use crate::pipeline::events::ExtractionError;

/// Application-level constants
pub const APP_NAME: &str = "calextract";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_TIMEZONE: &str = "America/Toronto";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Budget for a direct LLM-path call.
pub const DEFAULT_BUDGET_MS: u64 = 8_000;
/// Budget the selection policy gives the LLM path.
pub const DEFAULT_SMART_BUDGET_MS: u64 = 15_000;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1_024;
pub const LLM_CONNECT_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_CACHE_CAPACITY: usize = 1_024;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("warn,{}=info,{APP_NAME}=info", env!("CARGO_CRATE_NAME"))
}

/// Runtime configuration for the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractorConfig {
    pub model: String,
    pub budget_ms: u64,
    pub smart_budget_ms: u64,
    pub timezone: String,
    pub ollama_url: String,
    /// Never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    pub min_confidence: Option<f64>,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            budget_ms: DEFAULT_BUDGET_MS,
            smart_budget_ms: DEFAULT_SMART_BUDGET_MS,
            timezone: DEFAULT_TIMEZONE.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            api_key: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            min_confidence: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl ExtractorConfig {
    /// Defaults overlaid with `CALEXTRACT_*` environment variables.
    pub fn from_env() -> Result<Self, ExtractionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Blank values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExtractionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(model) = get("CALEXTRACT_MODEL") {
            config.model = model;
        }
        if let Some(v) = get("CALEXTRACT_BUDGET_MS") {
            config.budget_ms = parse_number("CALEXTRACT_BUDGET_MS", &v)?;
        }
        if let Some(v) = get("CALEXTRACT_SMART_BUDGET_MS") {
            config.smart_budget_ms = parse_number("CALEXTRACT_SMART_BUDGET_MS", &v)?;
        }
        if let Some(tz) = get("CALEXTRACT_TIMEZONE") {
            if parse_timezone(&tz).is_none() {
                return Err(ExtractionError::InvalidTimezone(tz));
            }
            config.timezone = tz;
        }
        if let Some(url) = get("CALEXTRACT_OLLAMA_URL") {
            config.ollama_url = url;
        }
        config.api_key = get("CALEXTRACT_API_KEY");
        if let Some(v) = get("CALEXTRACT_MAX_OUTPUT_TOKENS") {
            config.max_output_tokens = parse_number("CALEXTRACT_MAX_OUTPUT_TOKENS", &v)?;
        }
        if let Some(v) = get("CALEXTRACT_MIN_CONFIDENCE") {
            let floor: f64 = parse_number("CALEXTRACT_MIN_CONFIDENCE", &v)?;
            if !(0.0..=1.0).contains(&floor) {
                return Err(ExtractionError::Config(format!(
                    "CALEXTRACT_MIN_CONFIDENCE must be within [0, 1], got {floor}"
                )));
            }
            config.min_confidence = Some(floor);
        }
        if let Some(v) = get("CALEXTRACT_CACHE_CAPACITY") {
            config.cache_capacity = parse_number("CALEXTRACT_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = get("CALEXTRACT_CACHE_TTL_SECS") {
            config.cache_ttl_secs = parse_number("CALEXTRACT_CACHE_TTL_SECS", &v)?;
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ExtractionError> {
    value
        .parse()
        .map_err(|_| ExtractionError::Config(format!("{key} is not a valid number: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = ExtractorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ExtractorConfig::default());
        assert_eq!(config.model, "llama3.1:8b");
        assert_eq!(config.budget_ms, 8_000);
        assert_eq!(config.smart_budget_ms, 15_000);
        assert_eq!(config.timezone, "America/Toronto");
        assert!(config.min_confidence.is_none());
    }

    #[test]
    fn env_values_override_defaults() {
        let config = ExtractorConfig::from_lookup(lookup(&[
            ("CALEXTRACT_MODEL", "qwen2.5:7b"),
            ("CALEXTRACT_BUDGET_MS", "3000"),
            ("CALEXTRACT_TIMEZONE", "Europe/Paris"),
            ("CALEXTRACT_API_KEY", "secret"),
            ("CALEXTRACT_MIN_CONFIDENCE", "0.7"),
            ("CALEXTRACT_CACHE_CAPACITY", "16"),
        ]))
        .unwrap();
        assert_eq!(config.model, "qwen2.5:7b");
        assert_eq!(config.budget_ms, 3_000);
        assert_eq!(config.timezone, "Europe/Paris");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.min_confidence, Some(0.7));
        assert_eq!(config.cache_capacity, 16);
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = ExtractorConfig::from_lookup(lookup(&[("CALEXTRACT_MODEL", "  ")])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn bad_number_is_error() {
        let err = ExtractorConfig::from_lookup(lookup(&[("CALEXTRACT_BUDGET_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ExtractionError::Config(_)));
    }

    #[test]
    fn unknown_timezone_is_error() {
        let err = ExtractorConfig::from_lookup(lookup(&[("CALEXTRACT_TIMEZONE", "Mars/Olympus")])).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidTimezone(_)));
    }

    #[test]
    fn confidence_floor_out_of_range_is_error() {
        assert!(ExtractorConfig::from_lookup(lookup(&[("CALEXTRACT_MIN_CONFIDENCE", "1.5")])).is_err());
    }

    #[test]
    fn api_key_is_never_serialized() {
        let config = ExtractorConfig {
            api_key: Some("secret".into()),
            ..ExtractorConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn log_filter_names_this_crate() {
        assert!(default_log_filter().contains("calextract_lib=info"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }
}
