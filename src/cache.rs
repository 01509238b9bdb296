//! Content-addressed storage for fetched pages and derived artifacts.
//!
//! Every entry lives in a single directory as one file. The file name is the
//! entry's address: the lowercase hex SHA-256 of the source URL, plus a
//! suffix naming the artifact kind.
//!
//! ```text
//! cache_dir/
//! ├── 3f1c…9a.html          # raw page as fetched
//! ├── 3f1c…9a.txt           # extracted plain text used for matching
//! └── 3f1c…9a.styled.html   # styled rendering for human viewing
//! ```
//!
//! Parsed documents are not cached: scraper's `Html` cannot be serialized
//! and re-parsing a cached page is cheap.
//!
//! Writes overwrite; there is no version history. A read of a missing entry
//! is `Ok(None)`, never an error, so the caller decides whether absence means
//! "not fetched yet" or "fetch failed".

use sha2::{Digest, Sha256};
use std::error::Error;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

/// Suffix of the raw HTML entry.
pub const RAW_SUFFIX: &str = "html";
/// Suffix of the extracted plain-text artifact.
pub const TEXT_SUFFIX: &str = "txt";
/// Suffix of the styled rendering.
pub const STYLED_SUFFIX: &str = "styled.html";

/// Hex digest of a URL, the stem shared by all of its entries.
pub fn url_digest(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Full address (file name) of an entry.
pub fn address_of(url: &str, suffix: &str) -> String {
    format!("{}.{}", url_digest(url), suffix)
}

#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store raw HTML for `url` and return its address.
    pub async fn put(&self, url: &str, content: &str) -> Result<String, Box<dyn Error>> {
        self.put_derived(url, RAW_SUFFIX, content).await
    }

    /// Raw HTML for `url`, if cached.
    pub async fn get(&self, url: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_by_address(&address_of(url, RAW_SUFFIX)).await
    }

    pub async fn contains(&self, url: &str) -> bool {
        fs::try_exists(self.path_for(&address_of(url, RAW_SUFFIX)))
            .await
            .unwrap_or(false)
    }

    /// Store a derived artifact under `<digest>.<suffix>`.
    #[instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    pub async fn put_derived(
        &self,
        url: &str,
        suffix: &str,
        content: &str,
    ) -> Result<String, Box<dyn Error>> {
        fs::create_dir_all(&self.root).await?;
        let address = address_of(url, suffix);
        fs::write(self.path_for(&address), content).await?;
        debug!(%address, "Wrote cache entry");
        Ok(address)
    }

    pub async fn get_derived(
        &self,
        url: &str,
        suffix: &str,
    ) -> Result<Option<String>, Box<dyn Error>> {
        self.get_by_address(&address_of(url, suffix)).await
    }

    /// Read an entry by its address. Missing entries are `Ok(None)`.
    pub async fn get_by_address(&self, address: &str) -> Result<Option<String>, Box<dyn Error>> {
        if address.is_empty() || address.contains(['/', '\\']) {
            return Ok(None);
        }
        match fs::read_to_string(self.path_for(address)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry. Administrative reset, not used by the stages.
    pub async fn clear(&self) -> Result<usize, Box<dyn Error>> {
        let mut removed = 0;
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn path_for(&self, address: &str) -> PathBuf {
        self.root.join(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_stable_hex() {
        let a = address_of("http://example.com/a", RAW_SUFFIX);
        let b = address_of("http://example.com/a", RAW_SUFFIX);
        assert_eq!(a, b);
        assert!(a.ends_with(".html"));
        assert_eq!(url_digest("http://example.com/a").len(), 64);
        assert_ne!(a, address_of("http://example.com/b", RAW_SUFFIX));
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path().join("cache"));

        let address = cache.put("http://example.com/a", "<p>hi</p>").await.unwrap();
        assert_eq!(address, address_of("http://example.com/a", RAW_SUFFIX));
        assert_eq!(
            cache.get("http://example.com/a").await.unwrap().as_deref(),
            Some("<p>hi</p>")
        );
        assert_eq!(
            cache.get_by_address(&address).await.unwrap().as_deref(),
            Some("<p>hi</p>")
        );
        assert!(cache.contains("http://example.com/a").await);
    }

    #[tokio::test]
    async fn test_missing_entry_is_absent_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        assert!(cache.get("http://nowhere.test/").await.unwrap().is_none());
        assert!(cache.get_by_address("").await.unwrap().is_none());
        assert!(cache.get_by_address("../escape").await.unwrap().is_none());
        assert!(!cache.contains("http://nowhere.test/").await);
    }

    #[tokio::test]
    async fn test_rewrite_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        cache.put("http://example.com/a", "first").await.unwrap();
        cache.put("http://example.com/a", "second").await.unwrap();
        assert_eq!(
            cache.get("http://example.com/a").await.unwrap().as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_derived_entries_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        cache.put("http://example.com/a", "raw").await.unwrap();
        let text_address = cache
            .put_derived("http://example.com/a", TEXT_SUFFIX, "plain")
            .await
            .unwrap();
        assert!(text_address.ends_with(".txt"));
        assert_eq!(
            cache.get("http://example.com/a").await.unwrap().as_deref(),
            Some("raw")
        );
        assert_eq!(
            cache
                .get_derived("http://example.com/a", TEXT_SUFFIX)
                .await
                .unwrap()
                .as_deref(),
            Some("plain")
        );
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.get("http://example.com/a").await.unwrap().is_none());
    }
}
