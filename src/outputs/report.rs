//! Matched-news JSON report.
//!
//! One file per day, overwritten on each run:
//! `{output_dir}/{prefix}_matched_news_{YYYY-MM-DD}.json`.

use crate::models::ArticleRecord;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// One matched article as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub title: String,
    pub url: String,
    pub source: String,
    pub collected_at: String,
    pub keywords: String,
    pub subscriber_id: String,
}

impl From<&ArticleRecord> for ReportEntry {
    fn from(record: &ArticleRecord) -> Self {
        Self {
            title: record.title.clone(),
            url: record.url.clone(),
            source: record.source_name.clone(),
            collected_at: record.collected_at.clone(),
            keywords: record.match_result.to_string(),
            subscriber_id: record.subscriber_id.clone(),
        }
    }
}

/// Records collected on `date` whose keywords matched.
pub fn matched_on(records: &[ArticleRecord], date: &str) -> Vec<ReportEntry> {
    crate::store::matched(records)
        .filter(|r| r.collected_at == date)
        .map(ReportEntry::from)
        .collect()
}

pub fn report_path(output_dir: &Path, prefix: &str, date: &str) -> PathBuf {
    output_dir.join(format!("{prefix}_matched_news_{date}.json"))
}

/// Write the report for `date` and return its path.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), %date, count = entries.len()))]
pub async fn write_matched_news(
    output_dir: &Path,
    prefix: &str,
    date: &str,
    entries: &[ReportEntry],
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(entries)?;

    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = report_path(output_dir, prefix, date);
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote matched news report");
    Ok(path)
}
