//! Site-specific source adapters.
//!
//! An adapter knows how one site lays out its pages. The pipeline only sees
//! the [`SourceAdapter`] capability:
//!
//! 1. **Listing**: find candidate article links on a fetched listing page
//! 2. **Title**: pull a headline out of a fetched article page
//! 3. **Content region**: CSS selectors for the article body, most specific first
//!
//! # Supported Sources
//!
//! | Source | Module | Domain |
//! |--------|--------|--------|
//! | CNN | [`cnn`] | `edition.cnn.com` |
//! | Mail & Guardian | [`mgcoza`] | `mg.co.za` |
//!
//! Adapters are looked up by host through [`AdapterRegistry`]; a leading
//! `www.` is ignored.

use crate::models::{ArticleLink, UNTITLED};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

pub mod cnn;
pub mod mgcoza;

/// Selectors tried when an adapter does not supply its own.
pub const DEFAULT_CONTENT_SELECTORS: &[&str] = &[
    ".article-content",
    ".post-content",
    ".entry-content",
    ".content",
    "article",
    ".main-content",
];

const DEFAULT_TITLE_SELECTORS: &[&str] = &["h1", ".title", ".article-title", ".post-title", "title"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Collapse whitespace runs to single spaces and trim.
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// All descendant text of an element, whitespace-collapsed. Text nodes are
/// joined as-is so inline markup inside a word keeps the word whole.
pub fn element_text(element: &ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Resolve `href` against the listing page, dropping fragments and
/// non-http(s) schemes.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let mut resolved = base.join(href.trim()).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Host of `url` without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_lowercase())
}

/// First match of the first selector that hits, as clean text.
pub fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .map(|el| element_text(&el))
                .find(|text| !text.is_empty())
        })
}

/// Collect `<a href>` links under `scope` elements that pass `accept`,
/// de-duplicating against `seen`.
pub fn collect_links(
    document: &Html,
    scope: &str,
    base: &Url,
    seen: &mut HashSet<String>,
    accept: impl Fn(&str, &str) -> bool,
) -> Vec<ArticleLink> {
    let anchors = scope
        .split(',')
        .map(|s| format!("{} a[href]", s.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let Ok(selector) = Selector::parse(&anchors) else {
        return Vec::new();
    };
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let title = element_text(&element);
        if !accept(href, &title) {
            continue;
        }
        if let Some(url) = resolve_link(base, href) {
            if seen.insert(url.clone()) {
                links.push(ArticleLink { url, title });
            }
        }
    }
    links
}

/// A site-specific capability consumed by the discover and extract stages.
pub trait SourceAdapter: Send + Sync {
    /// Human-readable source name stored on each record.
    fn name(&self) -> &str;

    /// Host this adapter serves, without `www.`.
    fn domain(&self) -> &str;

    /// Candidate article links on a listing page, in page order, deduplicated.
    fn list_articles(&self, listing_url: &Url, listing_html: &str) -> Vec<ArticleLink>;

    /// Headline of an article page, or [`UNTITLED`].
    fn extract_title(&self, raw_html: &str) -> String {
        let document = Html::parse_document(raw_html);
        first_text(&document, DEFAULT_TITLE_SELECTORS).unwrap_or_else(|| UNTITLED.to_string())
    }

    /// Content-region selectors, most specific first.
    fn content_selectors(&self) -> &[&str] {
        DEFAULT_CONTENT_SELECTORS
    }

    /// Topical label from URL structure: the first path segment, title-cased,
    /// when the path has at least two segments.
    fn infer_section(&self, url: &Url) -> String {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() >= 2 {
            title_case(&segments[0].replace('-', " "))
        } else {
            String::new()
        }
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .filter(|w| !w.is_empty())
        .map(crate::utils::upcase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Adapters keyed by domain.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    /// Registry with every shipped adapter.
    pub fn with_builtin() -> Self {
        Self::new(vec![
            Box::new(cnn::CnnAdapter),
            Box::new(mgcoza::MailGuardianAdapter),
        ])
    }

    pub fn for_url(&self, url: &str) -> Option<&dyn SourceAdapter> {
        let domain = domain_of(url)?;
        self.adapters
            .iter()
            .find(|a| a.domain() == domain)
            .map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl SourceAdapter for Plain {
        fn name(&self) -> &str {
            "Plain"
        }
        fn domain(&self) -> &str {
            "example.com"
        }
        fn list_articles(&self, _: &Url, _: &str) -> Vec<ArticleLink> {
            Vec::new()
        }
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a \n\t b  "), "a b");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_element_text_joins_inline_nodes() {
        let html = Html::parse_fragment("<p>the <b>election</b>s and <i>a</i>\n  vote</p>");
        let selector = Selector::parse("p").unwrap();
        let p = html.select(&selector).next().unwrap();
        assert_eq!(element_text(&p), "the elections and a vote");
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://example.com/news/").unwrap();
        assert_eq!(
            resolve_link(&base, "/2025/05/06/story#top").as_deref(),
            Some("https://example.com/2025/05/06/story")
        );
        assert_eq!(
            resolve_link(&base, "story").as_deref(),
            Some("https://example.com/news/story")
        );
        assert_eq!(resolve_link(&base, "mailto:x@example.com"), None);
    }

    #[test]
    fn test_domain_of_strips_www() {
        assert_eq!(domain_of("https://www.mg.co.za/news").as_deref(), Some("mg.co.za"));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AdapterRegistry::with_builtin();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.for_url("https://edition.cnn.com/world").map(|a| a.name()),
            Some("CNN")
        );
        assert_eq!(
            registry.for_url("https://www.mg.co.za/").map(|a| a.name()),
            Some("Mail & Guardian")
        );
        assert!(registry.for_url("https://unknown.example/").is_none());
    }

    #[test]
    fn test_default_title_and_section() {
        let adapter = Plain;
        assert_eq!(
            adapter.extract_title("<html><body><h1> Big  News </h1></body></html>"),
            "Big News"
        );
        assert_eq!(adapter.extract_title("<html><body></body></html>"), UNTITLED);

        let url = Url::parse("https://example.com/world-news/some-story").unwrap();
        assert_eq!(adapter.infer_section(&url), "World News");
        let shallow = Url::parse("https://example.com/story").unwrap();
        assert_eq!(adapter.infer_section(&shallow), "");
    }

    #[test]
    fn test_collect_links_dedupes() {
        let html = Html::parse_document(
            r#"<div class="x"><a href="/a">Alpha story here</a><a href="/a">Alpha again</a>
               <a href="/b">b</a></div>"#,
        );
        let base = Url::parse("https://example.com/").unwrap();
        let mut seen = HashSet::new();
        let links = collect_links(&html, ".x", &base, &mut seen, |_, title| title.len() > 3);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/a");
        assert_eq!(links[0].title, "Alpha story here");
    }
}
