//! CNN International adapter.
//!
//! Listing pages on `edition.cnn.com` link stories from cards and
//! containers. Article URLs carry a `/YYYY/MM/DD/` date path or end in
//! `index.html`; video, gallery, and live pages are skipped.

use super::{SourceAdapter, collect_links, first_text};
use crate::models::{ArticleLink, UNTITLED};
use crate::utils::upcase;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

static ARTICLE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"index\.html|/\d{4}/\d{2}/\d{2}/").expect("static regex"));

static EXCLUDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)video|gallery|opinion|live-news|weather|sport|entertainment|/tv/")
        .expect("static regex")
});

/// Listing scopes tried in order; later scopes only add unseen links.
const SCOPES: &[&str] = &[
    "article",
    "[class*=container], [class*=card], [class*=zone]",
    "body",
];

fn is_article_link(href: &str, title: &str) -> bool {
    title.chars().count() >= 10 && ARTICLE_PATH.is_match(href) && !EXCLUDED.is_match(href)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CnnAdapter;

impl SourceAdapter for CnnAdapter {
    fn name(&self) -> &str {
        "CNN"
    }

    fn domain(&self) -> &str {
        "edition.cnn.com"
    }

    fn list_articles(&self, listing_url: &Url, listing_html: &str) -> Vec<ArticleLink> {
        let document = Html::parse_document(listing_html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for scope in SCOPES {
            let found = collect_links(&document, scope, listing_url, &mut seen, is_article_link);
            debug!(scope, count = found.len(), "CNN listing scope");
            links.extend(found);
        }
        links
    }

    fn extract_title(&self, raw_html: &str) -> String {
        let document = Html::parse_document(raw_html);
        first_text(
            &document,
            &["h1.headline__text", "h1.pg-headline", "h1.article-title", "h1"],
        )
        .unwrap_or_else(|| UNTITLED.to_string())
    }

    fn content_selectors(&self) -> &[&str] {
        &[
            ".article__content",
            ".l-container__content",
            ".article-content",
            ".content",
        ]
    }

    /// Dated story paths (`/2025/05/06/politics/...`) put the section after
    /// the date.
    fn infer_section(&self, url: &Url) -> String {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| {
                s.filter(|p| !p.is_empty() && !p.chars().all(|c| c.is_ascii_digit()))
                    .collect()
            })
            .unwrap_or_default();
        match segments.as_slice() {
            [first, _, ..] => upcase(&first.replace('-', " ")),
            _ => String::new(),
        }
    }
}
