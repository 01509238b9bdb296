//! Downstream outputs built from the article store.
//!
//! # Submodules
//!
//! - [`report`]: writes today's matched articles to a dated JSON file
//! - [`notify`]: renders per-subscriber digests and hands them to a [`notify::Notifier`]
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── news_aggregation_articles.json                # the article store
//! ├── news_aggregation_matched_news_2025-05-06.json # report
//! ├── content/                                      # styled article pages
//! └── outbox/
//!     └── news-digest-2025-05-06-1-a-example-com.md # digest for subscriber "1"
//! ```

pub mod notify;
pub mod report;
