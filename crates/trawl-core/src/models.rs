use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A compiled-in source this system ingests from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Stable identifier, used as the rate-limit key and the record source.
    pub id: String,
    /// Canonical listing URL.
    pub url: String,
    /// Cooldown applied after tier exhaustion. Falls back to the fetcher default.
    pub cooldown: Option<Duration>,
    /// JS-gated sources skip the direct tier.
    pub requires_render: bool,
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            cooldown: None,
            requires_render: false,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn with_requires_render(mut self, requires_render: bool) -> Self {
        self.requires_render = requires_render;
        self
    }
}

/// One structured item extracted from a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub source: String,
    pub title: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Record {
    /// Build a record; the id is derived from source and link so re-crawls
    /// of the same listing produce the same key.
    pub fn new(source: &str, title: impl Into<String>, link: impl Into<String>) -> Self {
        let link = link.into();
        Self {
            id: compute_hash(&format!("{source}\n{link}")),
            source: source.to_string(),
            title: title.into(),
            link,
            price: None,
            posted_at: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_posted_at(mut self, posted_at: impl Into<String>) -> Self {
        self.posted_at = Some(posted_at.into());
        self
    }
}

/// Aggregate outcome of one crawl cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlCycleResult {
    /// Records accepted by the sink.
    pub total_records: usize,
    pub successful_sources: usize,
    pub failed_sources: usize,
    pub duration: Duration,
}

/// Compute SHA-256 hash of content, returned as hex string.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
