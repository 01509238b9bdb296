//! Stage orchestration over the article store.
//!
//! Each stage loads the store, builds a new collection, and saves it before
//! returning, so stages can run alone, in sequence, or as a full pipeline
//! and a crash between stages loses no completed work.
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | discover | listing pages, article pages | raw cache entries, new records |
//! | extract | raw cache entries | text and styled artifacts, `extracted_cache_key`, `section` |
//! | filter | extracted text | `match_result` |
//! | report | store | dated JSON report |
//! | notify | store | outbox messages |
//!
//! Per-item failures are collected as [`ItemOutcome`]s; a stage fails only
//! when it cannot complete its pass (for example, the store cannot be read).

use crate::cache::{ContentCache, RAW_SUFFIX, STYLED_SUFFIX, TEXT_SUFFIX, address_of};
use crate::config::{Config, CrawlMode, ReprocessPolicy};
use crate::extractor;
use crate::fetch::Fetch;
use crate::matcher::{KeywordMatcher, needs_evaluation};
use crate::models::{ArticleLink, ArticleRecord, MatchResult, UNTITLED};
use crate::outputs::notify::{self, OutboxNotifier};
use crate::outputs::report;
use crate::sources::{AdapterRegistry, DEFAULT_CONTENT_SELECTORS, SourceAdapter, clean_text};
use crate::store::{self, ArticleStore};
use crate::utils::{today, truncate_for_log};
use chrono::Local;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Article pages fetched concurrently from one source.
pub const MAX_CONCURRENT_FETCHES_PER_SOURCE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Discover,
    Extract,
    Filter,
    Report,
    Notify,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Discover,
        Stage::Extract,
        Stage::Filter,
        Stage::Report,
        Stage::Notify,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discover => "discover",
            Stage::Extract => "extract",
            Stage::Filter => "filter",
            Stage::Report => "report",
            Stage::Notify => "notify",
        };
        f.write_str(name)
    }
}

/// Result of processing one source, page, or record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome<T> {
    Ok(T),
    /// Not an error; the item is left for a later run.
    Skipped(String),
    Failed(String),
}

/// Per-stage tally of item outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            succeeded: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn record<T>(&mut self, outcome: &ItemOutcome<T>) {
        match outcome {
            ItemOutcome::Ok(_) => self.succeeded += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// A newly discovered article page, before fan-out to subscribers.
#[derive(Debug, Clone)]
struct DiscoveredPage {
    url: String,
    title: String,
    raw_cache_key: String,
    section: String,
    source_name: String,
}

/// Output of extracting one URL, applied to all of its records.
#[derive(Debug, Clone)]
struct ExtractedPage {
    extracted_cache_key: String,
    section: String,
}

/// Explicit context for all stages, built once at process start.
pub struct Pipeline<F: Fetch> {
    config: Arc<Config>,
    cache: ContentCache,
    content: ContentCache,
    store: ArticleStore,
    adapters: AdapterRegistry,
    fetcher: F,
    matcher: KeywordMatcher,
    reprocess: ReprocessPolicy,
    notifier: OutboxNotifier,
}

impl<F: Fetch> Pipeline<F> {
    pub fn new(config: Arc<Config>, fetcher: F) -> Self {
        Self {
            cache: ContentCache::new(config.cache_dir.clone()),
            content: ContentCache::new(config.content_dir()),
            store: ArticleStore::new(config.store_path()),
            adapters: AdapterRegistry::with_builtin(),
            matcher: KeywordMatcher::new(config.case_sensitive, config.match_type),
            reprocess: config.reprocess,
            notifier: OutboxNotifier::new(config.outbox_dir()),
            fetcher,
            config,
        }
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_reprocess(mut self, policy: ReprocessPolicy) -> Self {
        self.reprocess = policy;
        self
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub async fn run_stage(&self, stage: Stage) -> Result<StageReport, Box<dyn Error>> {
        let report = match stage {
            Stage::Discover => self.discover().await,
            Stage::Extract => self.extract().await,
            Stage::Filter => self.filter().await,
            Stage::Report => self.report().await,
            Stage::Notify => self.notify().await,
        };
        match &report {
            Ok(r) => info!(
                %stage,
                succeeded = r.succeeded,
                skipped = r.skipped,
                failed = r.failed,
                "Stage complete"
            ),
            Err(e) => error!(%stage, error = %e, "Stage failed"),
        }
        report
    }

    /// Run `stages` in order, stopping at the first stage that fails.
    pub async fn run(&self, stages: &[Stage]) -> Result<Vec<StageReport>, Box<dyn Error>> {
        let mut reports = Vec::with_capacity(stages.len());
        for stage in stages {
            reports.push(self.run_stage(*stage).await?);
        }
        Ok(reports)
    }

    // ---- discover ----

    /// Crawl every distinct source once and fan new articles out to each
    /// subscriber listing that source.
    #[instrument(level = "info", skip_all, fields(mode = ?self.config.crawl_mode))]
    pub async fn discover(&self) -> Result<StageReport, Box<dyn Error>> {
        let full = self.config.crawl_mode == CrawlMode::Full;
        let existing = if full {
            info!("Full crawl: rebuilding store from scratch");
            Vec::new()
        } else {
            self.store.load().await?
        };
        let mut known: HashSet<String> = existing.iter().map(|r| r.url.clone()).collect();
        let collected_at = today();
        let mut report = StageReport::new(Stage::Discover);
        let mut incoming = Vec::new();

        for source in self.config.all_sources() {
            let subscribers = self.config.subscribers_for(&source);
            let outcomes = match self.discover_source(&source, &mut known, full).await {
                ItemOutcome::Ok(outcomes) => outcomes,
                other => {
                    report.record(&other);
                    continue;
                }
            };
            for outcome in outcomes {
                report.record(&outcome);
                let ItemOutcome::Ok(page) = outcome else {
                    continue;
                };
                for subscriber_id in &subscribers {
                    incoming.push(ArticleRecord {
                        collected_at: collected_at.clone(),
                        title: page.title.clone(),
                        url: page.url.clone(),
                        raw_cache_key: page.raw_cache_key.clone(),
                        extracted_cache_key: String::new(),
                        section: page.section.clone(),
                        source_name: page.source_name.clone(),
                        subscriber_id: subscriber_id.clone(),
                        match_result: MatchResult::Pending,
                    });
                }
            }
        }

        let added = incoming.len();
        let merged = store::merge(existing, incoming);
        self.store.save(&merged).await?;
        info!(added, total = merged.len(), "Discovery merged into store");
        Ok(report)
    }

    /// List one source and fetch its new article pages.
    #[instrument(level = "info", skip(self, known, full))]
    async fn discover_source(
        &self,
        source: &str,
        known: &mut HashSet<String>,
        full: bool,
    ) -> ItemOutcome<Vec<ItemOutcome<DiscoveredPage>>> {
        let Some(adapter) = self.adapters.for_url(source) else {
            warn!("No adapter for source; skipping");
            return ItemOutcome::Skipped(format!("no adapter for {source}"));
        };
        let listing_url = match Url::parse(source) {
            Ok(u) => u,
            Err(e) => return ItemOutcome::Failed(format!("invalid source url {source}: {e}")),
        };
        let listing_html = match self.fetcher.fetch(source).await {
            Ok(html) => html,
            Err(e) => {
                error!(error = %e, "Listing fetch failed");
                return ItemOutcome::Failed(format!("listing fetch failed: {e}"));
            }
        };

        let mut links = adapter.list_articles(&listing_url, &listing_html);
        let listed = links.len();
        if links.len() > self.config.max_articles_per_source {
            info!(
                listed,
                max = self.config.max_articles_per_source,
                "Capping articles for source"
            );
            links.truncate(self.config.max_articles_per_source);
        }
        let fresh: Vec<ArticleLink> = links
            .into_iter()
            .filter(|link| known.insert(link.url.clone()))
            .collect();
        info!(listed, new = fresh.len(), "Indexed source");

        let pages: Vec<ItemOutcome<DiscoveredPage>> = stream::iter(fresh)
            .map(|link| self.fetch_article(adapter, link, full))
            .buffered(MAX_CONCURRENT_FETCHES_PER_SOURCE)
            .collect()
            .await;
        ItemOutcome::Ok(pages)
    }

    /// Fetch (or reuse) one article page and derive its record fields.
    async fn fetch_article(
        &self,
        adapter: &dyn SourceAdapter,
        link: ArticleLink,
        full: bool,
    ) -> ItemOutcome<DiscoveredPage> {
        let url = link.url;
        let cached = if full {
            None
        } else {
            match self.cache.get(&url).await {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(%url, error = %e, "Cache read failed; refetching");
                    None
                }
            }
        };

        let (html, raw_cache_key) = match cached {
            Some(html) => {
                debug!(%url, "Reusing cached page");
                (html, address_of(&url, RAW_SUFFIX))
            }
            None => {
                let html = match self.fetcher.fetch(&url).await {
                    Ok(html) => html,
                    Err(e) => {
                        let reason = truncate_for_log(&e.to_string(), 200);
                        warn!(%url, error = %reason, "Article fetch failed");
                        return ItemOutcome::Failed(reason);
                    }
                };
                match self.cache.put(&url, &html).await {
                    Ok(key) => (html, key),
                    Err(e) => {
                        error!(%url, error = %e, "Cache write failed");
                        return ItemOutcome::Failed(format!("cache write failed: {e}"));
                    }
                }
            }
        };

        let mut title = adapter.extract_title(&html);
        if title == UNTITLED && !link.title.trim().is_empty() {
            title = clean_text(&link.title);
        }
        let section = Url::parse(&url)
            .map(|u| adapter.infer_section(&u))
            .unwrap_or_default();

        ItemOutcome::Ok(DiscoveredPage {
            url,
            title,
            raw_cache_key,
            section,
            source_name: adapter.name().to_string(),
        })
    }

    // ---- extract ----

    /// Extract text for every record that lacks it. Each URL is extracted
    /// once and the result applied to all of its subscribers' records.
    #[instrument(level = "info", skip_all)]
    pub async fn extract(&self) -> Result<StageReport, Box<dyn Error>> {
        let records = self.store.load().await?;
        let mut report = StageReport::new(Stage::Extract);

        let pending: Vec<&ArticleRecord> = records
            .iter()
            .filter(|r| !r.is_extracted())
            .unique_by(|r| r.url.clone())
            .collect();
        if pending.is_empty() {
            info!("All articles already extracted");
            return Ok(report);
        }
        info!(count = pending.len(), "Extracting articles");

        let mut extracted: HashMap<String, ExtractedPage> = HashMap::new();
        for record in pending {
            let outcome = self.extract_record(record).await;
            report.record(&outcome);
            match outcome {
                ItemOutcome::Ok(page) => {
                    extracted.insert(record.url.clone(), page);
                }
                ItemOutcome::Skipped(reason) => {
                    debug!(url = %record.url, %reason, "Left for a later run")
                }
                ItemOutcome::Failed(reason) => {
                    warn!(url = %record.url, %reason, "Extraction failed")
                }
            }
        }

        let updated: Vec<ArticleRecord> = records
            .into_iter()
            .map(|mut record| {
                if !record.is_extracted() {
                    if let Some(page) = extracted.get(&record.url) {
                        record.extracted_cache_key = page.extracted_cache_key.clone();
                        if !page.section.is_empty() {
                            record.section = page.section.clone();
                        }
                    }
                }
                record
            })
            .collect();
        self.store.save(&updated).await?;
        Ok(report)
    }

    async fn extract_record(&self, record: &ArticleRecord) -> ItemOutcome<ExtractedPage> {
        let raw = match self.raw_html(record).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ItemOutcome::Skipped("raw page not cached".to_string()),
            Err(e) => return ItemOutcome::Failed(format!("cache read failed: {e}")),
        };

        let adapter = self.adapters.for_url(&record.url);
        let selectors = adapter
            .map(|a| a.content_selectors())
            .unwrap_or(DEFAULT_CONTENT_SELECTORS);
        let article = match extractor::extract(&raw, selectors) {
            Ok(article) => article,
            Err(rejection) => return ItemOutcome::Skipped(rejection.to_string()),
        };
        debug!(url = %record.url, strategy = ?article.strategy, chars = article.text.len(), "Extracted");

        let extracted_cache_key = match self
            .cache
            .put_derived(&record.url, TEXT_SUFFIX, &article.text)
            .await
        {
            Ok(key) => key,
            Err(e) => return ItemOutcome::Failed(format!("cache write failed: {e}")),
        };

        let styled = extractor::render_styled(
            &record.title,
            &record.source_name,
            &record.url,
            &article.paragraphs,
            Local::now(),
        );
        if let Err(e) = self.content.put_derived(&record.url, STYLED_SUFFIX, &styled).await {
            warn!(url = %record.url, error = %e, "Styled rendering not saved");
        }

        let section = match (adapter, Url::parse(&record.url)) {
            (Some(adapter), Ok(url)) => adapter.infer_section(&url),
            _ => String::new(),
        };
        ItemOutcome::Ok(ExtractedPage {
            extracted_cache_key,
            section,
        })
    }

    async fn raw_html(&self, record: &ArticleRecord) -> Result<Option<String>, Box<dyn Error>> {
        if let Some(raw) = self.cache.get_by_address(&record.raw_cache_key).await? {
            return Ok(Some(raw));
        }
        self.cache.get(&record.url).await
    }

    // ---- filter ----

    /// Evaluate each subscriber's records against their keywords under the
    /// configured reprocessing policy.
    #[instrument(level = "info", skip_all, fields(policy = ?self.reprocess))]
    pub async fn filter(&self) -> Result<StageReport, Box<dyn Error>> {
        let records = self.store.load().await?;
        let mut report = StageReport::new(Stage::Filter);
        let mut texts: HashMap<String, String> = HashMap::new();
        let mut results: HashMap<(String, String), MatchResult> = HashMap::new();

        for subscriber in &self.config.subscribers {
            let compiled = match self.matcher.compile(&subscriber.keywords) {
                Ok(compiled) if compiled.is_empty() => {
                    info!(subscriber = %subscriber.id, "No keywords; skipping");
                    continue;
                }
                Ok(compiled) => compiled,
                Err(e) => {
                    error!(subscriber = %subscriber.id, error = %e, "Invalid keywords");
                    report.record(&ItemOutcome::<()>::Failed(e.to_string()));
                    continue;
                }
            };

            let due: Vec<&ArticleRecord> = store::for_subscriber(&records, &subscriber.id)
                .filter(|r| needs_evaluation(&r.match_result, self.reprocess))
                .collect();
            info!(subscriber = %subscriber.id, count = due.len(), "Matching keywords");

            for record in due {
                let text = self.matching_text(record, &mut texts).await;
                let result = MatchResult::from_keywords(compiled.evaluate(&text));
                report.record(&ItemOutcome::Ok(()));
                results.insert(
                    (record.url.clone(), record.subscriber_id.clone()),
                    result,
                );
            }
        }

        let updated: Vec<ArticleRecord> = records
            .into_iter()
            .map(|mut record| {
                if let Some(result) =
                    results.remove(&(record.url.clone(), record.subscriber_id.clone()))
                {
                    record.match_result = result;
                }
                record
            })
            .collect();
        self.store.save(&updated).await?;
        Ok(report)
    }

    /// Text a record is matched against: the extracted artifact, else the
    /// raw page, else the title. Shared across subscribers by URL.
    async fn matching_text(
        &self,
        record: &ArticleRecord,
        texts: &mut HashMap<String, String>,
    ) -> String {
        if let Some(text) = texts.get(&record.url) {
            return text.clone();
        }
        let text = match self.lookup_text(record).await {
            Ok(Some(text)) => text,
            Ok(None) => record.title.clone(),
            Err(e) => {
                warn!(url = %record.url, error = %e, "Falling back to title for matching");
                record.title.clone()
            }
        };
        texts.insert(record.url.clone(), text.clone());
        text
    }

    async fn lookup_text(&self, record: &ArticleRecord) -> Result<Option<String>, Box<dyn Error>> {
        if record.is_extracted() {
            if let Some(text) = self
                .cache
                .get_by_address(&record.extracted_cache_key)
                .await?
            {
                return Ok(Some(text));
            }
        }
        Ok(self
            .raw_html(record)
            .await?
            .map(|raw| extractor::page_text(&raw))
            .filter(|text| !text.is_empty()))
    }

    // ---- report & notify ----

    #[instrument(level = "info", skip_all)]
    pub async fn report(&self) -> Result<StageReport, Box<dyn Error>> {
        let records = self.store.load().await?;
        let date = today();
        let entries = report::matched_on(&records, &date);
        report::write_matched_news(
            &self.config.output_dir,
            &self.config.output_file_prefix,
            &date,
            &entries,
        )
        .await?;

        let stats = store::statistics(&records, &date);
        info!(
            total = stats.total,
            matched = stats.matched,
            unmatched = stats.unmatched,
            pending = stats.pending,
            extracted = stats.extracted,
            today = stats.collected_today,
            by_subscriber = ?stats.by_subscriber,
            "Store statistics"
        );

        let mut report = StageReport::new(Stage::Report);
        report.succeeded = entries.len();
        Ok(report)
    }

    #[instrument(level = "info", skip_all)]
    pub async fn notify(&self) -> Result<StageReport, Box<dyn Error>> {
        let mut report = StageReport::new(Stage::Notify);
        if !self.config.notifications.enabled {
            info!("Notifications disabled; skipping");
            return Ok(report);
        }
        let sender = self
            .config
            .notifications
            .sender_email
            .as_deref()
            .ok_or(crate::config::ConfigError::MissingSender)?;
        let records = self.store.load().await?;
        let (sent, failed) = notify::send_digests(
            &self.notifier,
            sender,
            &self.config.subscribers,
            &records,
            &today(),
        )
        .await;
        report.succeeded = sent;
        report.failed = failed;
        Ok(report)
    }
}
