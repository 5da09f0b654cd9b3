pub mod config;
pub mod pipeline;
pub mod result_cache; // Latest result per caller (bounded)
pub mod service;

use tracing_subscriber::EnvFilter;

pub use pipeline::events::{
    Event, ExtractionError, ExtractionRequest, ExtractionResult, ExtractionWarning, WarningCode,
};
pub use service::ExtractionService;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins; otherwise `config::default_log_filter()`. Logs go to
/// stderr so stdout stays clean for JSON output.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();

    if result.is_ok() {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
