use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use calextract_lib::config::ExtractorConfig;
use calextract_lib::pipeline::events::parse_subject_range;
use calextract_lib::{ExtractionError, ExtractionRequest, ExtractionService};
use clap::Parser;

/// Caller key used for the local cache when running from the command line.
const CLI_CALLER: &str = "cli";

#[derive(Parser)]
#[command(name = "calextract", version)]
#[command(about = "Extract calendar events from free text")]
struct Cli {
    /// Read text from this file instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// IANA timezone for interpreting the text (default from CALEXTRACT_TIMEZONE)
    #[arg(short, long)]
    timezone: Option<String>,

    /// Reference instant for relative phrases (ISO-8601, default now)
    #[arg(short, long)]
    reference: Option<String>,

    /// Skip the language model and use date-phrase rules only
    #[arg(long)]
    rules_only: bool,

    /// Model identifier (default from CALEXTRACT_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Parse a subject line time range instead of extracting events
    #[arg(long)]
    subject: Option<String>,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    calextract_lib::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "calextract failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String, ExtractionError> {
    if let Some(subject) = cli.subject.as_deref() {
        let range = parse_subject_range(subject);
        return to_json(&range, cli.compact);
    }

    let config = ExtractorConfig::from_env()?;
    let text = read_input(cli.file.as_ref())?;

    let mut request = ExtractionRequest::new(text).with_timezone(
        cli.timezone
            .clone()
            .unwrap_or_else(|| config.timezone.clone()),
    );
    request.reference_date = cli.reference.clone();
    request.model = cli.model.clone();

    let service = ExtractionService::from_config(&config)?;
    let result = if cli.rules_only {
        service.extract_rules(CLI_CALLER, request)
    } else {
        service.extract(CLI_CALLER, request).await
    };

    to_json(&result, cli.compact)
}

fn read_input(file: Option<&PathBuf>) -> Result<String, ExtractionError> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, ExtractionError> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(json)
}
