//! Data models shared by the pipeline stages.
//!
//! - [`ArticleRecord`]: one row of the article store, per (URL, subscriber)
//! - [`MatchResult`]: outcome of keyword evaluation for a record
//! - [`ArticleLink`]: a candidate article found on a listing page
//!
//! Records are persisted as flat string rows ([`StoredRow`]); conversion to
//! and from the typed record happens at the store boundary so every textual
//! field is normalized to an owned string, never null.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder title used when neither the page nor the listing yields one.
pub const UNTITLED: &str = "Untitled";

/// Rendered form of [`MatchResult::NoMatch`].
pub const NO_MATCH: &str = "no match";

/// Separator between matched keywords in the rendered form.
pub const KEYWORD_SEPARATOR: &str = ", ";

/// Keyword evaluation state of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MatchResult {
    /// Never evaluated.
    #[default]
    Pending,
    /// Evaluated, zero keywords matched.
    NoMatch,
    /// Matched keywords in the order of the subscriber's keyword list.
    ///
    /// Stored as one `", "`-joined string, so a keyword must not contain a
    /// comma or equal [`NO_MATCH`]; `Config::validate` rejects such keywords.
    Matched(Vec<String>),
}

impl MatchResult {
    pub fn from_keywords(matched: Vec<String>) -> Self {
        if matched.is_empty() {
            Self::NoMatch
        } else {
            Self::Matched(matched)
        }
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            Self::Pending
        } else if raw == NO_MATCH {
            Self::NoMatch
        } else {
            Self::Matched(
                raw.split(KEYWORD_SEPARATOR.trim())
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect(),
            )
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => Ok(()),
            Self::NoMatch => f.write_str(NO_MATCH),
            Self::Matched(keywords) => f.write_str(&keywords.join(KEYWORD_SEPARATOR)),
        }
    }
}

/// A candidate article discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleLink {
    pub url: String,
    pub title: String,
}

/// One row of the article store. `(url, subscriber_id)` is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArticleRecord {
    /// `YYYY-MM-DD` the URL was first discovered.
    pub collected_at: String,
    pub title: String,
    pub url: String,
    pub raw_cache_key: String,
    /// Empty until the extract stage succeeds.
    pub extracted_cache_key: String,
    pub section: String,
    pub source_name: String,
    pub subscriber_id: String,
    pub match_result: MatchResult,
}

impl ArticleRecord {
    pub fn key(&self) -> (&str, &str) {
        (&self.url, &self.subscriber_id)
    }

    pub fn is_extracted(&self) -> bool {
        !self.extracted_cache_key.is_empty()
    }
}

/// On-disk row: every column optional and string-typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredRow {
    #[serde(default)]
    pub collected_at: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub raw_cache_key: Option<String>,
    #[serde(default)]
    pub extracted_cache_key: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub subscriber_id: Option<String>,
    #[serde(default)]
    pub match_result: Option<String>,
}

impl From<StoredRow> for ArticleRecord {
    fn from(row: StoredRow) -> Self {
        Self {
            collected_at: row.collected_at.unwrap_or_default(),
            title: row.title.unwrap_or_default(),
            url: row.url.unwrap_or_default(),
            raw_cache_key: row.raw_cache_key.unwrap_or_default(),
            extracted_cache_key: row.extracted_cache_key.unwrap_or_default(),
            section: row.section.unwrap_or_default(),
            source_name: row.source_name.unwrap_or_default(),
            subscriber_id: row.subscriber_id.unwrap_or_default(),
            match_result: MatchResult::parse(row.match_result.as_deref().unwrap_or_default()),
        }
    }
}

impl From<&ArticleRecord> for StoredRow {
    fn from(record: &ArticleRecord) -> Self {
        Self {
            collected_at: Some(record.collected_at.clone()),
            title: Some(record.title.clone()),
            url: Some(record.url.clone()),
            raw_cache_key: Some(record.raw_cache_key.clone()),
            extracted_cache_key: Some(record.extracted_cache_key.clone()),
            section: Some(record.section.clone()),
            source_name: Some(record.source_name.clone()),
            subscriber_id: Some(record.subscriber_id.clone()),
            match_result: Some(record.match_result.to_string()),
        }
    }
}
