//! Per-subscriber digests of matched articles.
//!
//! Delivery goes through the [`Notifier`] trait. The shipped
//! [`OutboxNotifier`] renders each message as Markdown and drops it into an
//! outbox directory, one file per recipient and day, for an external mail
//! relay to pick up. Delivery is at-most-once per run; nothing tracks what
//! was already sent.

use crate::config::Subscriber;
use crate::models::ArticleRecord;
use crate::utils::slugify;
use itertools::Itertools;
use std::error::Error;
use std::fmt::Write;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument, warn};

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery transport.
pub trait Notifier {
    /// Deliver `message`, returning a transport-specific receipt.
    async fn deliver(&self, message: &Message) -> Result<String, Box<dyn Error>>;
}

#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Notifier for OutboxNotifier {
    #[instrument(level = "info", skip_all, fields(to = %message.to))]
    async fn deliver(&self, message: &Message) -> Result<String, Box<dyn Error>> {
        fs::create_dir_all(&self.dir).await?;
        let name = format!("{}.md", slugify(&format!("{} {}", message.subject, message.to)));
        let path = self.dir.join(name);
        let mut content = String::new();
        let _ = writeln!(content, "From: {}", message.from);
        let _ = writeln!(content, "To: {}", message.to);
        let _ = writeln!(content, "Subject: {}\n", message.subject);
        content.push_str(&message.body);
        fs::write(&path, content).await?;
        info!(path = %path.display(), "Dropped message into outbox");
        Ok(path.display().to_string())
    }
}

/// Markdown digest of `records`, grouped by source.
pub fn render_digest(subscriber: &Subscriber, records: &[&ArticleRecord], date: &str) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# News digest for {date}\n");
    let _ = writeln!(
        md,
        "{} matched article(s) for keywords: {}\n",
        records.len(),
        subscriber.keywords.join(", ")
    );
    let by_source = records
        .iter()
        .sorted_by(|a, b| a.source_name.cmp(&b.source_name))
        .chunk_by(|r| r.source_name.clone());
    for (source, group) in &by_source {
        let _ = writeln!(md, "## {source}\n");
        for record in group {
            let _ = writeln!(md, "- [{}]({})", record.title, record.url);
            let _ = writeln!(md, "  - Keywords: {}", record.match_result);
            if !record.section.is_empty() {
                let _ = writeln!(md, "  - Section: {}", record.section);
            }
        }
        md.push('\n');
    }
    md
}

/// Send each subscriber their matched articles collected on `date`.
/// Subscribers with nothing new get no message. Returns (sent, failed).
pub async fn send_digests<N: Notifier>(
    notifier: &N,
    sender: &str,
    subscribers: &[Subscriber],
    records: &[ArticleRecord],
    date: &str,
) -> (usize, usize) {
    let mut sent = 0;
    let mut failed = 0;
    for subscriber in subscribers {
        let matched: Vec<&ArticleRecord> = crate::store::for_subscriber(records, &subscriber.id)
            .filter(|r| r.collected_at == date && r.match_result.is_matched())
            .collect();
        if matched.is_empty() {
            info!(subscriber = %subscriber.id, "No matched articles today; skipping");
            continue;
        }
        let message = Message {
            from: sender.to_string(),
            to: subscriber.email.clone(),
            subject: format!("News digest {date} ({})", subscriber.id),
            body: render_digest(subscriber, &matched, date),
        };
        match notifier.deliver(&message).await {
            Ok(receipt) => {
                info!(subscriber = %subscriber.id, %receipt, "Digest delivered");
                sent += 1;
            }
            Err(e) => {
                warn!(subscriber = %subscriber.id, error = %e, "Digest delivery failed");
                failed += 1;
            }
        }
    }
    (sent, failed)
}

/// A fixed test message to `address`.
pub fn test_message(sender: &str, address: &str, when: &str) -> Message {
    Message {
        from: sender.to_string(),
        to: address.to_string(),
        subject: "News pipeline test message".to_string(),
        body: format!(
            "# Test message\n\nThis is a test message from the news pipeline, sent {when}.\n\
             If you can read it, delivery to {address} works.\n"
        ),
    }
}
