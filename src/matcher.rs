//! Keyword matching over extracted article text.
//!
//! Matching behaviour is fixed at process start by [`KeywordMatcher`]:
//! case sensitivity and [`MatchType`]. A subscriber's keyword list is
//! compiled once into [`CompiledKeywords`] and then evaluated against any
//! number of articles.
//!
//! Results always follow the order of the keyword list, never the order in
//! which keywords occur in the text.

use crate::config::{MatchType, ReprocessPolicy};
use crate::models::MatchResult;
use regex::{Regex, RegexBuilder};
use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMatcher {
    pub case_sensitive: bool,
    pub match_type: MatchType,
}

#[derive(Debug)]
enum Pattern {
    Word(Regex),
    Substring(String),
}

/// A keyword list prepared for repeated evaluation.
#[derive(Debug)]
pub struct CompiledKeywords {
    case_sensitive: bool,
    entries: Vec<(String, Pattern)>,
}

impl KeywordMatcher {
    pub fn new(case_sensitive: bool, match_type: MatchType) -> Self {
        Self {
            case_sensitive,
            match_type,
        }
    }

    /// Prepare `keywords` for matching. Blank keywords are dropped.
    pub fn compile(&self, keywords: &[String]) -> Result<CompiledKeywords, Box<dyn Error>> {
        let mut entries = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let trimmed = keyword.trim();
            if trimmed.is_empty() {
                continue;
            }
            let pattern = match self.match_type {
                MatchType::WholeWord => Pattern::Word(
                    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(trimmed)))
                        .case_insensitive(!self.case_sensitive)
                        .build()?,
                ),
                MatchType::Substring if self.case_sensitive => {
                    Pattern::Substring(trimmed.to_string())
                }
                MatchType::Substring => Pattern::Substring(trimmed.to_lowercase()),
            };
            entries.push((keyword.clone(), pattern));
        }
        Ok(CompiledKeywords {
            case_sensitive: self.case_sensitive,
            entries,
        })
    }

    /// One-shot evaluation of `keywords` against `text`.
    pub fn evaluate(&self, text: &str, keywords: &[String]) -> Result<Vec<String>, Box<dyn Error>> {
        Ok(self.compile(keywords)?.evaluate(text))
    }
}

impl CompiledKeywords {
    /// Keywords found in `text`, in keyword-list order.
    pub fn evaluate(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let folded = (!self.case_sensitive).then(|| text.to_lowercase());
        let haystack = folded.as_deref().unwrap_or(text);

        self.entries
            .iter()
            .filter(|(_, pattern)| match pattern {
                Pattern::Word(re) => re.is_match(text),
                Pattern::Substring(needle) => haystack.contains(needle.as_str()),
            })
            .map(|(keyword, _)| keyword.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a record with `current` result is re-evaluated under `policy`.
pub fn needs_evaluation(current: &MatchResult, policy: ReprocessPolicy) -> bool {
    match policy {
        ReprocessPolicy::Forced => true,
        ReprocessPolicy::Pending => !current.is_matched(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_whole_word_boundary() {
        let m = KeywordMatcher::new(false, MatchType::WholeWord);
        assert_eq!(m.evaluate("a cat sat", &kw(&["cat"])).unwrap(), kw(&["cat"]));
        assert!(m.evaluate("concatenate", &kw(&["cat"])).unwrap().is_empty());
        assert_eq!(m.evaluate("the cat, sat.", &kw(&["cat"])).unwrap(), kw(&["cat"]));
    }

    #[test]
    fn test_substring_matches_inside_words() {
        let m = KeywordMatcher::new(false, MatchType::Substring);
        assert_eq!(m.evaluate("concatenate", &kw(&["cat"])).unwrap(), kw(&["cat"]));
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let m = KeywordMatcher::new(false, MatchType::WholeWord);
        assert_eq!(
            m.evaluate("breaking news today", &kw(&["News"])).unwrap(),
            kw(&["News"])
        );
        let s = KeywordMatcher::new(false, MatchType::Substring);
        assert_eq!(
            s.evaluate("BREAKING NEWS", &kw(&["news"])).unwrap(),
            kw(&["news"])
        );
    }

    #[test]
    fn test_case_sensitive() {
        let m = KeywordMatcher::new(true, MatchType::WholeWord);
        assert!(m.evaluate("breaking news today", &kw(&["News"])).unwrap().is_empty());
        let s = KeywordMatcher::new(true, MatchType::Substring);
        assert!(s.evaluate("breaking news today", &kw(&["News"])).unwrap().is_empty());
        assert_eq!(s.evaluate("Newsroom", &kw(&["News"])).unwrap(), kw(&["News"]));
    }

    #[test]
    fn test_results_follow_keyword_order() {
        let m = KeywordMatcher::new(false, MatchType::WholeWord);
        let text = "vote counting began after the election closed";
        assert_eq!(
            m.evaluate(text, &kw(&["election", "missing", "vote"])).unwrap(),
            kw(&["election", "vote"])
        );
    }

    #[test]
    fn test_special_characters_are_literal() {
        let m = KeywordMatcher::new(false, MatchType::WholeWord);
        assert_eq!(m.evaluate("prices rose 3.5 percent", &kw(&["3.5"])).unwrap(), kw(&["3.5"]));
        assert!(m.evaluate("prices rose 305 percent", &kw(&["3.5"])).unwrap().is_empty());
    }

    #[test]
    fn test_blank_keywords_and_text() {
        let m = KeywordMatcher::new(false, MatchType::Substring);
        let compiled = m.compile(&kw(&["", "  "])).unwrap();
        assert!(compiled.is_empty());
        assert!(m.evaluate("", &kw(&["x"])).unwrap().is_empty());
    }

    #[test]
    fn test_reprocess_policy() {
        let matched = MatchResult::Matched(kw(&["x"]));
        assert!(needs_evaluation(&MatchResult::Pending, ReprocessPolicy::Pending));
        assert!(needs_evaluation(&MatchResult::NoMatch, ReprocessPolicy::Pending));
        assert!(!needs_evaluation(&matched, ReprocessPolicy::Pending));
        assert!(needs_evaluation(&matched, ReprocessPolicy::Forced));
    }
}
