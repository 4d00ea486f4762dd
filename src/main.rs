use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use research_harvest::{Config, Query, SearchEngine, SourceId};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Search arXiv, Google Scholar, IEEE Xplore and the ACM Digital Library
/// for papers on a topic and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Research topic to search for
    topic: String,

    /// Comma-separated sources to query (default: all)
    #[arg(long, value_delimiter = ',', value_parser = parse_source)]
    sources: Vec<SourceId>,

    /// Maximum number of papers to return
    #[arg(long)]
    max_results: Option<usize>,

    /// Overall time budget in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_source(value: &str) -> std::result::Result<SourceId, String> {
    value.parse::<SourceId>().map_err(|e| e.to_string())
}

fn init_tracing(format: LogFormat, verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    let mut query = Query::from_config(&cli.topic, &config.search)?;
    if !cli.sources.is_empty() {
        query = query.with_sources(cli.sources);
    }
    if let Some(max_results) = cli.max_results {
        query = query.with_max_results(max_results);
    }
    if let Some(timeout) = cli.timeout {
        query = query.with_timeout(Duration::from_secs(timeout));
    }

    let engine = SearchEngine::from_config(&config);
    let result = engine.search(&query).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.is_empty() {
        error!("No papers found for '{}'", query.topic);
        std::process::exit(1);
    }

    info!("Found {} papers", result.len());
    Ok(())
}
