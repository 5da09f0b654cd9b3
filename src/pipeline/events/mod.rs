//! Text-to-calendar-event extraction.
//!
//! Two paths turn free text into `Event`s:
//! - rules: deterministic date-phrase recognition + title-by-proximity
//! - llm: constrained prompt → model → JSON recovery → schema → sanitize
//!
//! `SelectionPolicy` decides which path's output is authoritative. Every
//! public extraction operation returns a well-formed `ExtractionResult`;
//! failures surface as `degraded: true` plus warnings, never as `Err`.

pub mod types;
pub mod normalize;
pub mod timestamp;
pub mod dates;
pub mod rules;
pub mod prompt;
pub mod parser;
pub mod sanitize;
pub mod confidence;
pub mod dedup;
pub mod budget;
pub mod ollama;
pub mod llm;
pub mod orchestrator;
pub mod subject;

pub use types::*;
pub use normalize::*;
pub use dates::*;
pub use rules::*;
pub use parser::*;
pub use ollama::*;
pub use llm::*;
pub use orchestrator::*;
pub use subject::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("LLM server is not reachable at {0}")]
    LlmConnection(String),

    #[error("LLM server returned error (status {status}): {body}")]
    LlmStatus { status: u16, body: String },

    #[error("LLM server rejected credentials (status {0})")]
    Unauthorized(u16),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("LLM call cancelled")]
    Cancelled,

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExtractionError {
    /// Whether this error is the budget timer cancelling the call.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExtractionError::Cancelled)
    }
}
