//! Command-line interface definitions for the news pipeline.
//!
//! Stage flags select which stages run; with none given the whole pipeline
//! runs. Stages always run in pipeline order regardless of flag order.

use crate::pipeline::Stage;
use clap::Parser;

/// Command-line arguments for the news pipeline.
///
/// # Examples
///
/// ```sh
/// # Full run: discover, extract, filter, report, notify
/// news_pipeline --config config.yaml
///
/// # Only pick up new articles and extract them
/// news_pipeline --discover --extract
///
/// # Re-match everything after changing keywords
/// news_pipeline --filter --force-reprocess
///
/// # Check delivery without running any stage
/// news_pipeline --test-email me@example.com
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "NEWS_PIPELINE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Crawl sources and record new articles
    #[arg(long)]
    pub discover: bool,

    /// Extract text from fetched pages
    #[arg(long)]
    pub extract: bool,

    /// Match extracted text against subscriber keywords
    #[arg(long)]
    pub filter: bool,

    /// Write today's matched-news report
    #[arg(long)]
    pub report: bool,

    /// Deliver per-subscriber digests
    #[arg(long)]
    pub notify: bool,

    /// Run every stage (the default when no stage flag is given)
    #[arg(long)]
    pub full: bool,

    /// Re-evaluate every record in the filter stage, not only pending ones
    #[arg(long)]
    pub force_reprocess: bool,

    /// Send a test message to this address and exit
    #[arg(long, value_name = "ADDR")]
    pub test_email: Option<String>,
}

impl Cli {
    /// Stages to run, in pipeline order.
    pub fn stages(&self) -> Vec<Stage> {
        let selected = [
            (Stage::Discover, self.discover),
            (Stage::Extract, self.extract),
            (Stage::Filter, self.filter),
            (Stage::Report, self.report),
            (Stage::Notify, self.notify),
        ];
        if self.full || selected.iter().all(|(_, on)| !on) {
            return Stage::ALL.to_vec();
        }
        selected
            .into_iter()
            .filter_map(|(stage, on)| on.then_some(stage))
            .collect()
    }
}
