//! Runtime configuration loaded once at process start.
//!
//! The configuration is a YAML document describing the subscribers, the
//! crawl mode, and how keyword matching behaves. It is parsed into a
//! [`Config`] value, validated, and then shared read-only with every stage.
//!
//! # Example
//!
//! ```yaml
//! crawl_mode: incremental
//! max_articles_per_source: 50
//! match_type: whole_word
//! case_sensitive: false
//! notifications:
//!   enabled: true
//!   sender_email: news@example.com
//! subscribers:
//!   - id: "1"
//!     email: reader@example.com
//!     keywords: ["election", "budget"]
//!     sources: ["https://edition.cnn.com/politics"]
//! ```

use crate::models::NO_MATCH;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

/// Errors that halt the run before any stage executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no subscribers configured")]
    NoSubscribers,
    #[error("subscriber #{0} has an empty id")]
    EmptySubscriberId(usize),
    #[error("duplicate subscriber id {0:?}")]
    DuplicateSubscriber(String),
    #[error("subscriber {subscriber:?} has keyword {keyword:?}, which cannot contain ',' or be \"no match\"")]
    InvalidKeyword { subscriber: String, keyword: String },
    #[error("notifications are enabled but no sender_email is configured")]
    MissingSender,
}

/// Whether discovery skips URLs already present in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    #[default]
    Incremental,
    Full,
}

/// How a keyword is located inside article text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    WholeWord,
    Substring,
}

/// Which records the filter stage re-evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReprocessPolicy {
    /// Only records never evaluated or previously marked "no match".
    #[default]
    Pending,
    /// Every record, regardless of its prior result.
    Forced,
}

/// A reader who receives matches for their keywords from their sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub sender_email: Option<String>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            enabled: true,
            sender_email: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
    #[serde(default)]
    pub crawl_mode: CrawlMode,
    #[serde(default = "default_max_articles")]
    pub max_articles_per_source: usize,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub reprocess: ReprocessPolicy,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub output_file_prefix: String,
    #[serde(default = "default_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub notifications: Notifications,
}

fn default_true() -> bool {
    true
}

fn default_max_articles() -> usize {
    50
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("results/cache")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_prefix() -> String {
    "news_aggregation".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            crawl_mode: CrawlMode::default(),
            max_articles_per_source: default_max_articles(),
            match_type: MatchType::default(),
            case_sensitive: false,
            reprocess: ReprocessPolicy::default(),
            cache_dir: default_cache_dir(),
            output_dir: default_output_dir(),
            output_file_prefix: default_prefix(),
            fetch_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            notifications: Notifications::default(),
        }
    }
}

impl Config {
    /// Read and parse a YAML config file. Does not validate.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        info!(
            subscribers = config.subscribers.len(),
            crawl_mode = ?config.crawl_mode,
            match_type = ?config.match_type,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Check the fields every stage relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscribers.is_empty() {
            return Err(ConfigError::NoSubscribers);
        }
        let mut seen = HashSet::new();
        for (i, subscriber) in self.subscribers.iter().enumerate() {
            if subscriber.id.trim().is_empty() {
                return Err(ConfigError::EmptySubscriberId(i));
            }
            if !seen.insert(subscriber.id.as_str()) {
                return Err(ConfigError::DuplicateSubscriber(subscriber.id.clone()));
            }
            // Matched keywords are stored as one ", "-joined string.
            if let Some(keyword) = subscriber
                .keywords
                .iter()
                .find(|k| k.contains(',') || k.trim() == NO_MATCH)
            {
                return Err(ConfigError::InvalidKeyword {
                    subscriber: subscriber.id.clone(),
                    keyword: keyword.clone(),
                });
            }
        }
        if self.notifications.enabled
            && self
                .notifications
                .sender_email
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
        {
            return Err(ConfigError::MissingSender);
        }
        Ok(())
    }

    /// Distinct source URLs across all subscribers, sorted.
    pub fn all_sources(&self) -> Vec<String> {
        self.subscribers
            .iter()
            .flat_map(|s| s.sources.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Ids of subscribers listing `source`, in configuration order.
    pub fn subscribers_for(&self, source: &str) -> Vec<String> {
        self.subscribers
            .iter()
            .filter(|s| s.sources.iter().any(|u| u == source))
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn subscriber(&self, id: &str) -> Option<&Subscriber> {
        self.subscribers.iter().find(|s| s.id == id)
    }

    pub fn store_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_articles.json", self.output_file_prefix))
    }

    pub fn content_dir(&self) -> PathBuf {
        self.output_dir.join("content")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.output_dir.join("outbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
crawl_mode: full
match_type: substring
notifications:
  sender_email: news@example.com
subscribers:
  - id: "1"
    email: a@example.com
    keywords: ["election"]
    sources: ["http://example.com/news", "http://other.com/"]
  - id: "2"
    email: b@example.com
    keywords: ["budget"]
    sources: ["http://example.com/news"]
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.crawl_mode, CrawlMode::Full);
        assert_eq!(config.match_type, MatchType::Substring);
        assert!(!config.case_sensitive);
        assert_eq!(config.max_articles_per_source, 50);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.reprocess, ReprocessPolicy::Pending);
        assert!(config.notifications.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_all_sources_distinct_and_sorted() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.all_sources(),
            vec!["http://example.com/news", "http://other.com/"]
        );
        assert_eq!(config.subscribers_for("http://example.com/news"), vec!["1", "2"]);
        assert_eq!(config.subscribers_for("http://other.com/"), vec!["1"]);
        assert!(config.subscribers_for("http://missing.com/").is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_subscribers() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::NoSubscribers)));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.subscribers[1].id = "1".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSubscriber(id)) if id == "1"
        ));
    }

    #[test]
    fn test_validate_rejects_keywords_that_do_not_round_trip() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.subscribers[0].keywords = vec!["Washington, D.C.".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKeyword { subscriber, keyword })
                if subscriber == "1" && keyword == "Washington, D.C."
        ));

        config.subscribers[0].keywords = vec!["no match".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidKeyword { .. })));

        config.subscribers[0].keywords = vec!["Washington D.C.".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_sender_when_enabled() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.notifications.sender_email = None;
        assert!(matches!(config.validate(), Err(ConfigError::MissingSender)));

        config.notifications.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_path_uses_prefix() {
        let config = Config::default();
        assert_eq!(
            config.store_path(),
            PathBuf::from("results/news_aggregation_articles.json")
        );
    }
}
