use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bigquery::{BigQueryClient, auth};
use crate::config::Settings;
use crate::transcripts::report::{format_failure, format_results, format_summary};
use crate::transcripts::request::DEFAULT_RESULT_LIMIT;
use crate::transcripts::{SearchRequest, TranscriptSearcher};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout; each query attempt is additionally bounded by the retry policy.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_DAYS: i64 = 30;

/// Search call transcripts for a term, newest first, with context around each match.
#[derive(Parser, Debug)]
#[command(name = "transcript-search", version)]
pub struct Args {
    /// Terms to search for (a transcript matches if it contains any). Prompts when omitted.
    pub terms: Vec<String>,

    /// How many days back to search (0 = today only)
    #[arg(short, long, default_value_t = DEFAULT_DAYS, allow_negative_numbers = true)]
    pub days: i64,

    /// Dataset location. The default region expands to the configured fallback chain.
    #[arg(short, long)]
    pub region: Option<String>,

    /// Maximum number of transcripts to return
    #[arg(short, long, default_value_t = DEFAULT_RESULT_LIMIT)]
    pub limit: u32,

    /// Also print a summary of the matches
    #[arg(long)]
    pub summary: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid day count '{0}': expected a whole number")]
    InvalidDays(String),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Prompted {
    pub term: String,
    pub days: i64,
    pub region: String,
}

/// Ask for term, day count, and region; blank answers take the defaults.
pub fn prompt(
    mut input: impl BufRead,
    mut output: impl Write,
    default_region: &str,
) -> Result<Prompted, PromptError> {
    let mut ask = |question: &str| -> Result<String, PromptError> {
        write!(output, "{question}")?;
        output.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    };

    let term = ask("Enter search term: ")?;
    let days = ask(&format!("How many days back to search (default {DEFAULT_DAYS}): "))?;
    let region = ask(&format!("Enter dataset location (default {default_region}): "))?;

    let days = if days.is_empty() {
        DEFAULT_DAYS
    } else {
        days.parse().map_err(|_| PromptError::InvalidDays(days))?
    };
    let region = if region.is_empty() {
        default_region.to_string()
    } else {
        region
    };
    Ok(Prompted { term, days, region })
}

pub async fn run(args: Args) -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("invalid configuration: {e}");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (terms, days, region) = if args.terms.is_empty() {
        let default_region = settings.default_region.clone();
        let answers = tokio::task::spawn_blocking(move || {
            prompt(std::io::stdin().lock(), std::io::stdout(), &default_region)
        })
        .await;
        match answers {
            Ok(Ok(p)) => (vec![p.term], p.days, p.region),
            Ok(Err(e)) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                error!("prompt task failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let region = args
            .region
            .unwrap_or_else(|| settings.default_region.clone());
        (args.terms, args.days, region)
    };

    let request = match SearchRequest::new(terms, days, &region)
        .and_then(|r| r.with_limit(args.limit))
    {
        Ok(r) => r,
        Err(e) => {
            eprint!("{}", format_failure(&e, &settings.project));
            return ExitCode::FAILURE;
        }
    };

    let http = match Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            error!("failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let client = BigQueryClient::new(
        http,
        auth::resolve_token(),
        &settings.project,
        &settings.api_base,
    );
    let searcher = TranscriptSearcher::new(client, &settings);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling search");
                cancel.cancel();
            }
        }
    });

    info!(
        terms = ?request.terms(),
        days = request.days_back(),
        region = %request.preferred_region(),
        limit = request.result_limit(),
        "searching transcripts"
    );

    match searcher.search(&request, &cancel).await {
        Ok(outcome) => {
            print!("{}", format_results(&outcome, request.terms()));
            if args.summary {
                println!();
                print!("{}", format_summary(&outcome.records));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprint!("{}", format_failure(&e, &settings.project));
            ExitCode::FAILURE
        }
    }
}
