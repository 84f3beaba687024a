//! registry-search CLI
//!
//! Runs one registry name search and prints the extracted records as JSON.

use anyhow::Context;
use clap::Parser;
use registry_search::captcha::TesseractOcr;
use registry_search::config::SearchConfig;
use registry_search::retry::{run_with_retry, RetryPolicy};
use std::sync::Arc;

/// CAPTCHA-gated registry name search
#[derive(Parser, Debug)]
#[command(name = "registry-search")]
#[command(version)]
#[command(about = "Search a CAPTCHA-gated web registry and print structured results")]
struct Args {
    /// The search term
    term: String,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Target search page URL (defaults to the registry search page)
    #[arg(long)]
    target_url: Option<String>,

    /// User agent to use; repeat to build a pool
    #[arg(long = "user-agent")]
    user_agents: Vec<String>,

    /// Directory for failure screenshots and CAPTCHA bitmaps
    #[arg(long)]
    diagnostics_dir: Option<String>,

    /// Maximum attempts, each with a fresh browser session
    #[arg(long, default_value = "3")]
    attempts: u32,

    /// Delay between attempts in milliseconds
    #[arg(long, default_value = "2000")]
    backoff_ms: u64,

    /// Tesseract executable to use for OCR
    #[arg(long, default_value = "tesseract")]
    tesseract: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut builder = SearchConfig::builder().headless(!args.headed);
    if let Some(path) = args.chrome_path {
        builder = builder.chrome_path(path);
    }
    if let Some(url) = args.target_url {
        builder = builder.target_url(url);
    }
    for ua in args.user_agents {
        builder = builder.user_agent(ua);
    }
    if let Some(dir) = args.diagnostics_dir {
        builder = builder.diagnostics_dir(dir);
    }
    let config = builder.build();

    let policy = RetryPolicy {
        attempts: args.attempts,
        backoff_ms: args.backoff_ms,
    };
    let ocr = Arc::new(TesseractOcr::with_binary(args.tesseract));

    let outcome = run_with_retry(&args.term, &config, ocr, policy)
        .await
        .map_err(|failure| anyhow::anyhow!("{failure}"))?;

    let json = serde_json::to_string_pretty(&outcome).context("serializing outcome")?;
    println!("{json}");
    Ok(())
}
