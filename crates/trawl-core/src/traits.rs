use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, TierError};
use crate::fetcher::{FetchRequest, Payload};
use crate::models::{Record, SourceDescriptor};
use crate::proxy_list::ProxyCandidate;
use crate::proxy_pool::RefreshOutcome;
use crate::render::RenderStrategy;

/// Process-shared key-value store with per-key expiry.
pub trait TtlCache: Send + Sync + Clone {
    /// Returns `None` when the key is absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, AppError>> + Send;

    /// Store `value` under `key`, replacing any previous value and TTL.
    fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Produces a usable markup payload for a source.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, request: &FetchRequest)
    -> impl Future<Output = Result<Payload, AppError>> + Send;
}

/// Turns a fetched payload into records.
pub trait Extractor: Send + Sync + Clone {
    fn extract(&self, source: &SourceDescriptor, html: &str) -> Result<Vec<Record>, AppError>;
}

/// Downstream durable log receiving records.
pub trait PublishSink: Send + Sync + Clone {
    fn publish(
        &self,
        record_key: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Bound every partition to roughly `max_len` entries.
    fn trim_all(&self, max_len: usize) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Read side of the proxy pool, as seen by tiers that need a proxy.
pub trait ProxyProvider: Send + Sync {
    fn refresh(&self) -> impl Future<Output = Result<RefreshOutcome, AppError>> + Send;

    fn fastest(&self) -> impl Future<Output = Result<ProxyCandidate, AppError>> + Send;

    fn top(&self, n: usize) -> impl Future<Output = Vec<ProxyCandidate>> + Send;
}

/// Downloads a plaintext proxy list.
pub trait ProxyFeed: Send + Sync {
    fn fetch_list(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Wire-level check of one proxy candidate.
///
/// Returns the measured latency when the candidate works. Failures are not
/// errors; the candidate is simply left out of the pool.
pub trait ProxyProbe: Send + Sync {
    fn probe(&self, candidate: &ProxyCandidate) -> impl Future<Output = Option<Duration>> + Send;
}

/// External JS-challenge bypass service.
pub trait BypassClient: Send + Sync {
    /// Cheap reachability check.
    fn probe(&self) -> impl Future<Output = bool> + Send;

    /// Solve `url`, optionally through a proxy URL such as `socks5://1.2.3.4:1080`.
    fn solve(
        &self,
        url: &str,
        proxy: Option<&str>,
    ) -> impl Future<Output = Result<String, TierError>> + Send;
}

/// External headless-browser rendering service.
pub trait RenderClient: Send + Sync {
    fn probe(&self) -> impl Future<Output = Result<(), TierError>> + Send;

    fn render(
        &self,
        url: &str,
        strategy: &RenderStrategy,
    ) -> impl Future<Output = Result<String, TierError>> + Send;
}
