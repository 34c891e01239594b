//! Per-source cooldown backed by a TTL cache.
//!
//! A source is blocked while its key exists in the cache. Cache failures are
//! treated as "not blocked" so an outage degrades to unconditional fetching
//! instead of stalling every source.

use std::time::Duration;

use crate::error::AppError;
use crate::traits::TtlCache;

const KEY_PREFIX: &str = "ratelimit:";

#[derive(Clone)]
pub struct RateLimitGate<C: TtlCache> {
    cache: C,
}

impl<C: TtlCache> RateLimitGate<C> {
    pub fn new(cache: C) -> Self {
        Self { cache }
    }

    pub async fn is_blocked(&self, source: &str) -> bool {
        match self.cache.get(&cache_key(source)).await {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                tracing::warn!(%source, error = %e, "Rate-limit cache unavailable, failing open");
                false
            }
        }
    }

    /// Block `source` for `duration`, replacing any existing cooldown.
    pub async fn block(&self, source: &str, duration: Duration) -> Result<(), AppError> {
        let value = duration.as_secs().to_string();
        self.cache
            .set(&cache_key(source), value.as_bytes(), duration)
            .await?;
        tracing::info!(%source, cooldown_secs = duration.as_secs(), "Source blocked");
        Ok(())
    }
}

fn cache_key(source: &str) -> String {
    format!("{KEY_PREFIX}{source}")
}
