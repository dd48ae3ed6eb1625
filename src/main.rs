mod bigquery;
mod cli;
mod config;
mod transcripts;

pub const USER_AGENT: &str = concat!("transcript-search/", env!("CARGO_PKG_VERSION"));

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("transcript_search=info".parse()?),
        )
        .init();

    let args = cli::Args::parse();
    info!("starting transcript search");
    let code = cli::run(args).await;
    info!("done");
    Ok(code)
}
