//! Mail & Guardian (`mg.co.za`) adapter.

use super::{SourceAdapter, collect_links, first_text};
use crate::models::{ArticleLink, UNTITLED};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use url::Url;

static EXCLUDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)category|tag|author|search|contact|about|privacy|terms|advertise|subscribe|login|register|opinion|letters|cartoon",
    )
    .expect("static regex")
});

/// Sections whose first path segment is reported as the record's section.
const SECTIONS: &[&str] = &["news", "business", "thought-leader", "friday", "the-green-guardian"];

fn is_article_link(href: &str, title: &str) -> bool {
    title.chars().count() >= 10 && !EXCLUDED.is_match(href)
}

/// The page-wide pass is stricter: the link must look like a story path.
fn is_deep_article_link(href: &str, title: &str) -> bool {
    title.chars().count() > 12
        && is_article_link(href, title)
        && (href.contains("/article/") || href.split('/').count() >= 4)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MailGuardianAdapter;

impl SourceAdapter for MailGuardianAdapter {
    fn name(&self) -> &str {
        "Mail & Guardian"
    }

    fn domain(&self) -> &str {
        "mg.co.za"
    }

    fn list_articles(&self, listing_url: &Url, listing_html: &str) -> Vec<ArticleLink> {
        let document = Html::parse_document(listing_html);
        let mut seen = HashSet::new();
        let mut links = collect_links(&document, "article", listing_url, &mut seen, is_article_link);
        links.extend(collect_links(
            &document,
            "[class*=post], [class*=entry]",
            listing_url,
            &mut seen,
            is_article_link,
        ));
        links.extend(collect_links(
            &document,
            "body",
            listing_url,
            &mut seen,
            is_deep_article_link,
        ));
        links
    }

    fn extract_title(&self, raw_html: &str) -> String {
        let document = Html::parse_document(raw_html);
        first_text(
            &document,
            &["h1.entry-title", "h1.post-title", "h1.article-title", "h1.title", "h1"],
        )
        .unwrap_or_else(|| UNTITLED.to_string())
    }

    fn content_selectors(&self) -> &[&str] {
        &[".entry-content", ".post-content", ".article-content", ".content", "article"]
    }

    fn infer_section(&self, url: &Url) -> String {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [first, _, ..] if SECTIONS.contains(first) => first
                .split('-')
                .map(crate::utils::upcase)
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_articles() {
        let html = r#"<html><body>
            <article><a href="/news/2025-05-06-water-crisis-deepens/">Water crisis deepens in the metro</a></article>
            <div class="post-list"><a href="https://mg.co.za/business/2025-05-06-rand-slips/">Rand slips against the dollar</a></div>
            <a href="/category/news/">All the news category page</a>
            <a href="/opinion/2025-05-06-column/">An opinion column about things</a>
            <a href="/friday/2025-05-06-festival-roundup/">Festival roundup for the weekend</a>
        </body></html>"#;
        let base = Url::parse("https://mg.co.za/").unwrap();
        let links = MailGuardianAdapter.list_articles(&base, html);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://mg.co.za/news/2025-05-06-water-crisis-deepens/",
                "https://mg.co.za/business/2025-05-06-rand-slips/",
                "https://mg.co.za/friday/2025-05-06-festival-roundup/",
            ]
        );
    }

    #[test]
    fn test_infer_section_known_only() {
        let known = Url::parse("https://mg.co.za/thought-leader/2025-05-06-x/").unwrap();
        assert_eq!(MailGuardianAdapter.infer_section(&known), "Thought Leader");
        let unknown = Url::parse("https://mg.co.za/sport/2025-05-06-x/").unwrap();
        assert_eq!(MailGuardianAdapter.infer_section(&unknown), "");
    }
}
