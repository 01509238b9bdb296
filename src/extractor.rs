//! Readable-text extraction from cached article pages.
//!
//! Extraction is a layered fallback; the first strategy that yields enough
//! text wins:
//!
//! 1. Strip non-content elements (`script`, `style`, `nav`, `header`,
//!    `footer`, `aside`).
//! 2. Try the source's content-region selectors, most specific first. A
//!    region counts only if its text is longer than [`MIN_REGION_CHARS`].
//! 3. Otherwise join the first [`MAX_PARAGRAPHS`] `<p>` elements whose text
//!    is longer than [`MIN_PARAGRAPH_CHARS`].
//! 4. Prefix the page `<title>` unless the body already contains it
//!    (case-insensitive).
//! 5. Collapse whitespace.
//!
//! A body shorter than [`MIN_BODY_CHARS`] is rejected. The caller leaves the
//! record unextracted so the next run retries it.

use crate::sources::{clean_text, element_text};
use chrono::{DateTime, Local};
use html_escape::{encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::fmt::Write;

pub const MIN_REGION_CHARS: usize = 200;
pub const MIN_PARAGRAPH_CHARS: usize = 30;
pub const MAX_PARAGRAPHS: usize = 10;
pub const MIN_BODY_CHARS: usize = 50;

static NON_CONTENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script, style, nav, header, footer, aside").expect("static selector"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

/// Which strategy produced the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Region(String),
    Paragraphs(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Final matching text: optional title prefix plus body, whitespace-collapsed.
    pub text: String,
    /// Body blocks before collapsing, for the styled rendering.
    pub paragraphs: Vec<String>,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No strategy produced a body of at least [`MIN_BODY_CHARS`].
    TooShort { chars: usize },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { chars } => write!(f, "extracted body too short ({chars} chars)"),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Parse and drop non-content subtrees.
///
/// `Html::select` still visits detached nodes, so the pruned tree is
/// serialized and parsed again before any selector runs on it.
fn stripped_document(raw_html: &str) -> Html {
    let mut document = Html::parse_document(raw_html);
    let ids: Vec<_> = document.select(&NON_CONTENT).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
    Html::parse_document(&document.root_element().html())
}

fn page_title(document: &Html) -> String {
    document
        .select(&TITLE)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default()
}

fn with_title(title: &str, body: &str) -> String {
    if title.is_empty() || body.to_lowercase().contains(&title.to_lowercase()) {
        clean_text(body)
    } else {
        clean_text(&format!("{title} {body}"))
    }
}

fn region_text(document: &Html, selectors: &[&str]) -> Option<(String, String)> {
    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element_text(&element);
            if char_len(&text) > MIN_REGION_CHARS {
                return Some((raw.to_string(), text));
            }
        }
    }
    None
}

fn paragraph_texts(document: &Html) -> Vec<String> {
    document
        .select(&PARAGRAPH)
        .map(|p| element_text(&p))
        .filter(|t| char_len(t) > MIN_PARAGRAPH_CHARS)
        .take(MAX_PARAGRAPHS)
        .collect()
}

/// Extract clean article text from raw HTML.
pub fn extract(raw_html: &str, selectors: &[&str]) -> Result<Extracted, Rejection> {
    let document = stripped_document(raw_html);

    let (paragraphs, strategy) = match region_text(&document, selectors) {
        Some((selector, text)) => (vec![text], Strategy::Region(selector)),
        None => {
            let paragraphs = paragraph_texts(&document);
            let n = paragraphs.len();
            (paragraphs, Strategy::Paragraphs(n))
        }
    };

    let body = clean_text(&paragraphs.join("\n\n"));
    let chars = char_len(&body);
    if chars < MIN_BODY_CHARS {
        return Err(Rejection::TooShort { chars });
    }

    let text = with_title(&page_title(&document), &body);
    Ok(Extracted {
        text,
        paragraphs,
        strategy,
    })
}

/// Whole-page text for records that have not been extracted yet: the body
/// of the stripped document, title-prefixed under the same rule.
pub fn page_text(raw_html: &str) -> String {
    let document = stripped_document(raw_html);
    let title = page_title(&document);
    let body = document
        .select(&BODY)
        .next()
        .map(|b| element_text(&b))
        .unwrap_or_default();
    with_title(&title, &body)
}

const STYLE: &str = "body{font-family:-apple-system,'Segoe UI',Roboto,sans-serif;line-height:1.6;\
max-width:800px;margin:0 auto;padding:20px;background:#f9f9f9;color:#333}\
.article-header{background:linear-gradient(135deg,#667eea 0%,#764ba2 100%);color:#fff;\
padding:30px;border-radius:10px;margin-bottom:30px}\
.article-meta{margin-top:15px;font-size:.9em;opacity:.9}\
.article-content{background:#fff;padding:40px;border-radius:10px}\
.article-content p{margin-bottom:1.2em;font-size:1.1em;line-height:1.8}\
.article-footer{text-align:center;color:#666;font-size:.9em;padding:20px}";

/// Standalone HTML page for reading an extracted article.
pub fn render_styled(
    title: &str,
    source: &str,
    url: &str,
    paragraphs: &[String],
    extracted_at: DateTime<Local>,
) -> String {
    let title = encode_text(title);
    let mut body = String::new();
    for paragraph in paragraphs.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let _ = writeln!(body, "    <p>{}</p>", encode_text(paragraph));
    }
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <style>{STYLE}</style>
</head>
<body>
  <div class="article-header">
    <h1>{title}</h1>
    <div class="article-meta">Source: {source} &middot; Extracted: {when}</div>
  </div>
  <div class="article-content">
{body}  </div>
  <div class="article-footer"><a href="{href}">{url}</a></div>
</body>
</html>
"#,
        source = encode_text(source),
        when = extracted_at.format("%Y-%m-%d %H:%M:%S"),
        href = encode_double_quoted_attribute(url),
        url = encode_text(url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long(word: &str, n: usize) -> String {
        vec![word; n].join(" ")
    }

    #[test]
    fn test_region_selector_wins_when_long_enough() {
        let html = format!(
            r#"<html><head><title>Budget</title></head><body>
               <nav>Home Sections Subscribe</nav>
               <div class="article-content">{} <script>var x = 1;</script></div>
               <p>{}</p></body></html>"#,
            long("budget", 40),
            long("paragraph", 10)
        );
        let out = extract(&html, &[".missing", ".article-content"]).unwrap();
        assert_eq!(out.strategy, Strategy::Region(".article-content".into()));
        assert!(!out.text.contains("var x"));
        assert!(out.text.starts_with("budget budget"));
        // title already present case-insensitively is not prefixed
        assert!(!out.text.starts_with("Budget"));
    }

    #[test]
    fn test_short_region_falls_back_to_paragraphs() {
        let html = format!(
            r#"<html><head><title>Local Story</title></head><body>
               <article>tiny</article>
               <p>short one</p>
               <p>{}</p>
               <p>{}</p></body></html>"#,
            long("council meeting", 5),
            long("water supply", 5)
        );
        let out = extract(&html, &["article"]).unwrap();
        assert_eq!(out.strategy, Strategy::Paragraphs(2));
        assert!(out.text.starts_with("Local Story council meeting"));
        assert!(!out.text.contains("short one"));
        assert!(!out.text.contains("  "));
    }

    #[test]
    fn test_paragraphs_capped() {
        let paragraphs: String = (0..15)
            .map(|i| format!("<p>paragraph number {i} with plenty of padding text</p>"))
            .collect();
        let html = format!("<html><body>{paragraphs}</body></html>");
        let out = extract(&html, &[]).unwrap();
        assert_eq!(out.strategy, Strategy::Paragraphs(MAX_PARAGRAPHS));
        assert!(out.text.contains("number 9 "));
        assert!(!out.text.contains("number 10 "));
    }

    #[test]
    fn test_too_short_is_rejected() {
        let html = "<html><head><title>A very long title that does not count</title></head>\
                    <body><p>Only a little text here.</p></body></html>";
        assert!(matches!(
            extract(html, &["article"]),
            Err(Rejection::TooShort { .. })
        ));
    }

    #[test]
    fn test_stripped_elements_do_not_count() {
        let html = format!(
            "<html><body><footer><p>{}</p></footer><aside><p>{}</p></aside></body></html>",
            long("footer text", 10),
            long("aside text", 10)
        );
        assert!(extract(&html, &[]).is_err());
    }

    #[test]
    fn test_chrome_paragraphs_do_not_leak() {
        let html = "<html><body>\
            <footer><p>Subscribe to our newsletter for the latest election coverage today</p></footer>\
            <nav><div class=\"content\">Election results live election results live election results live \
            election results live election results live election results live election results live \
            election results live election results live election results live</div></nav>\
            <p>The council approved the new water budget after a long debate on Tuesday.</p>\
            </body></html>";
        let out = extract(html, &[".content"]).unwrap();
        assert_eq!(out.strategy, Strategy::Paragraphs(1));
        assert!(out.text.starts_with("The council approved"));
        assert!(!out.text.to_lowercase().contains("election"));
    }

    #[test]
    fn test_inline_markup_does_not_split_words() {
        let sentence = "Turnout figures from the <b>election</b>s held last spring were revised upward.";
        let html = format!("<html><body><p>{sentence}</p><p>{sentence}</p></body></html>");
        let out = extract(&html, &[]).unwrap();
        assert!(out.text.contains("from the elections held"));
        assert!(!out.text.contains("election s"));

        let matcher = crate::matcher::KeywordMatcher::new(false, crate::config::MatchType::WholeWord);
        assert!(matcher
            .evaluate(&out.text, &["election".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_page_text() {
        let html = "<html><head><title>Headline</title><style>p{}</style></head>\
                    <body><header>menu</header><p>Body   words</p></body></html>";
        assert_eq!(page_text(html), "Headline Body words");
    }

    #[test]
    fn test_render_styled_escapes() {
        let html = render_styled(
            "A <b> title",
            "CNN",
            "https://example.com/?a=1&b=2",
            &["First & only".to_string()],
            Local::now(),
        );
        assert!(html.contains("<title>A &lt;b&gt; title</title>"));
        assert!(html.contains("<p>First &amp; only</p>"));
        assert!(html.contains(r#"href="https://example.com/?a=1&amp;b=2""#));
    }
}
