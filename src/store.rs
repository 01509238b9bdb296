//! The canonical, deduplicated table of discovered articles.
//!
//! The table is persisted as a single JSON document holding an array of
//! flat string rows. It is loaded and saved as a whole; saves go through a
//! sibling temp file and a rename so a crash never leaves a half-written
//! table behind.
//!
//! Only one pipeline run may own a store at a time. [`StoreLock`] takes an
//! exclusive lock file next to the table and releases it on drop.

use crate::models::{ArticleRecord, MatchResult, StoredRow};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store {0} is locked by another run (remove the lock file if it is stale)")]
    Locked(String),
    #[error("store file {path} is malformed: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Concatenate `existing` and `incoming`, then keep only the last
/// occurrence of each `(url, subscriber_id)`.
///
/// Survivors stay at the position of their last occurrence, so incoming
/// records always win over existing ones for the same key.
pub fn merge(existing: Vec<ArticleRecord>, incoming: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let combined: Vec<ArticleRecord> = existing.into_iter().chain(incoming).collect();
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(combined.len());
    let mut kept: Vec<ArticleRecord> = combined
        .into_iter()
        .rev()
        .filter(|r| seen.insert((r.url.clone(), r.subscriber_id.clone())))
        .collect();
    kept.reverse();
    kept
}

/// Aggregate counts over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStatistics {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub pending: usize,
    pub extracted: usize,
    pub collected_today: usize,
    pub by_subscriber: BTreeMap<String, usize>,
}

pub fn statistics(records: &[ArticleRecord], today: &str) -> StoreStatistics {
    let mut stats = StoreStatistics {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        match record.match_result {
            MatchResult::Matched(_) => stats.matched += 1,
            MatchResult::NoMatch => stats.unmatched += 1,
            MatchResult::Pending => stats.pending += 1,
        }
        if record.is_extracted() {
            stats.extracted += 1;
        }
        if record.collected_at == today {
            stats.collected_today += 1;
        }
        *stats
            .by_subscriber
            .entry(record.subscriber_id.clone())
            .or_insert(0) += 1;
    }
    stats
}

/// Records first collected on `date` (`YYYY-MM-DD`).
pub fn collected_on<'a>(
    records: &'a [ArticleRecord],
    date: &'a str,
) -> impl Iterator<Item = &'a ArticleRecord> + 'a {
    records.iter().filter(move |r| r.collected_at == date)
}

pub fn matched(records: &[ArticleRecord]) -> impl Iterator<Item = &ArticleRecord> {
    records.iter().filter(|r| r.match_result.is_matched())
}

pub fn for_subscriber<'a>(
    records: &'a [ArticleRecord],
    subscriber_id: &'a str,
) -> impl Iterator<Item = &'a ArticleRecord> + 'a {
    records.iter().filter(move |r| r.subscriber_id == subscriber_id)
}

#[derive(Debug, Clone)]
pub struct ArticleStore {
    path: PathBuf,
}

impl ArticleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record. A missing file is an empty store.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<ArticleRecord>, Box<dyn Error>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No store file yet; starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<StoredRow> =
            serde_json::from_str(&raw).map_err(|source| PipelineError::Malformed {
                path: self.path.display().to_string(),
                source,
            })?;
        let records: Vec<ArticleRecord> = rows.into_iter().map(ArticleRecord::from).collect();
        info!(count = records.len(), "Loaded article store");
        Ok(records)
    }

    /// Replace the persisted table with `records`.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = records.len()))]
    pub async fn save(&self, records: &[ArticleRecord]) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let rows: Vec<StoredRow> = records.iter().map(StoredRow::from).collect();
        let json = serde_json::to_string_pretty(&rows)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Saved article store");
        Ok(())
    }

    /// Take the single-writer lock for this store.
    pub fn lock(&self) -> Result<StoreLock, Box<dyn Error>> {
        StoreLock::acquire(self.path.with_extension("lock"))
    }
}

/// Exclusive lock file held for the lifetime of a run.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(path: PathBuf) -> Result<Self, Box<dyn Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                debug!(path = %path.display(), "Acquired store lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(Box::new(PipelineError::Locked(path.display().to_string())))
            }
            Err(e) => Err(Box::new(e)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}
