//! In-process [`TtlCache`] backed by moka.
//!
//! Used when no shared store is configured (`--cache memory`). Entries expire
//! individually according to the TTL passed to [`TtlCache::set`].

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;

use crate::error::AppError;
use crate::traits::TtlCache;

const DEFAULT_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone)]
struct CachedValue {
    bytes: Vec<u8>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    // Overwrites restart the clock with the new TTL.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct MokaTtlCache {
    inner: Cache<String, CachedValue>,
}

impl MokaTtlCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

impl Default for MokaTtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache for MokaTtlCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        Ok(self.inner.get(key).await.map(|v| v.bytes))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), AppError> {
        self.inner
            .insert(
                key.to_string(),
                CachedValue {
                    bytes: value.to_vec(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}
