//! # News Pipeline
//!
//! An incremental content pipeline that crawls news sources, caches raw
//! pages, extracts readable text, and matches it against per-subscriber
//! keyword sets, keeping one deduplicated article table across runs.
//!
//! ## Usage
//!
//! ```sh
//! news_pipeline --config config.yaml
//! news_pipeline --discover --extract
//! ```
//!
//! ## Architecture
//!
//! The run is a sequence of independently resumable stages:
//! 1. **Discover**: list each distinct source once, fetch new article pages
//!    into the content cache, and fan records out to subscribers
//! 2. **Extract**: pull article text out of cached pages (4 strategies deep)
//! 3. **Filter**: match text against each subscriber's keywords
//! 4. **Report**: write today's matched articles as JSON
//! 5. **Notify**: drop a digest per subscriber into the outbox
//!
//! Every stage saves the article store before it returns.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod config;
mod extractor;
mod fetch;
mod matcher;
mod models;
mod outputs;
mod pipeline;
mod sources;
mod store;
mod utils;

use cli::Cli;
use config::{Config, ReprocessPolicy};
use fetch::HttpFetcher;
use outputs::notify::{self, Notifier, OutboxNotifier};
use pipeline::Pipeline;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let result = match args.test_email.as_deref() {
        Some(address) => send_test_email(&args.config, address).await,
        None => run(&args).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Run failed");
        std::process::exit(1);
    }
}

/// Deliver a test message. A missing or invalid config only loses the
/// configured sender and outbox location.
#[instrument(level = "info", skip_all, fields(%address))]
async fn send_test_email(config_path: &str, address: &str) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Using default settings for test message");
        Config::default()
    });
    let sender = config
        .notifications
        .sender_email
        .clone()
        .unwrap_or_else(|| address.to_string());
    let when = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let receipt = OutboxNotifier::new(config.outbox_dir())
        .deliver(&notify::test_message(&sender, address, &when))
        .await?;
    info!(%receipt, "Test message delivered");
    Ok(())
}

async fn run(args: &Cli) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!("news_pipeline starting up");

    let config = Config::load(&args.config)?;
    config.validate()?;

    // Early check: output dir must be writable before any stage runs
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let config = Arc::new(config);
    let fetcher = HttpFetcher::new(
        Duration::from_secs(config.fetch_timeout_secs),
        &config.user_agent,
    )?;
    let mut pipeline = Pipeline::new(Arc::clone(&config), fetcher);
    if args.force_reprocess {
        pipeline = pipeline.with_reprocess(ReprocessPolicy::Forced);
    }

    let _lock = pipeline.store().lock()?;
    let stages = args.stages();
    info!(?stages, "Running stages");
    let reports = pipeline.run(&stages).await?;

    let failed: usize = reports.iter().map(|r| r.failed).sum();
    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        item_failures = failed,
        "Execution complete"
    );
    Ok(())
}
