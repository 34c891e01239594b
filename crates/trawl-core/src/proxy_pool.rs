//! Self-maintaining pool of verified SOCKS5 proxies.
//!
//! A refresh downloads candidates from the first usable feed, probes them
//! concurrently and swaps in the fastest `size` working ones. Probing happens
//! without holding the state lock; only the final swap takes the write lock.
//! A refresh that finds nothing leaves the previous pool in place.

use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::proxy_list::{ProxyCandidate, parse_proxy_list};
use crate::traits::{ProxyFeed, ProxyProbe, ProxyProvider};

/// Feeds tried in order until one yields candidates.
pub const DEFAULT_FEEDS: [&str; 4] = [
    "https://spys.me/socks.txt",
    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/socks5.txt",
    "https://www.proxy-list.download/api/v1/get?type=socks5",
    "https://api.proxyscrape.com/v2/?request=get&protocol=socks5&timeout=10000&country=all&format=textplain",
];

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Maximum number of proxies kept after a refresh.
    pub size: usize,
    pub refresh_interval: Duration,
    /// Candidates are probed in chunks of this many.
    pub batch_size: usize,
    /// Maximum simultaneous probes.
    pub concurrency: usize,
    /// Stop probing once this many working candidates are found.
    /// `None` means twice the pool size.
    pub early_stop: Option<usize>,
    pub feeds: Vec<String>,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            size: 5,
            refresh_interval: Duration::from_secs(30 * 60),
            batch_size: 50,
            concurrency: 20,
            early_stop: None,
            feeds: DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ProxyPoolConfig {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size.max(1);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_early_stop(mut self, threshold: usize) -> Self {
        self.early_stop = Some(threshold);
        self
    }

    pub fn with_feeds(mut self, feeds: Vec<String>) -> Self {
        self.feeds = feeds;
        self
    }

    pub fn early_stop_threshold(&self) -> usize {
        self.early_stop.unwrap_or(self.size * 2).max(self.size)
    }
}

/// What a call to [`ProxyPool::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The pool was fresh and non-empty.
    Skipped,
    /// The pool now holds `count` freshly verified proxies.
    Refreshed { count: usize },
    /// Nothing usable was found; the previous pool is still in place.
    KeptPrevious,
}

/// Point-in-time view of the pool for logging.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub last_refresh_age: Option<Duration>,
    pub fastest: Option<String>,
    pub fastest_latency: Option<Duration>,
}

#[derive(Default)]
struct PoolState {
    /// Sorted ascending by latency, at most `size` entries, all working.
    proxies: Vec<ProxyCandidate>,
    last_refresh: Option<Instant>,
}

pub struct ProxyPool<F, P>
where
    F: ProxyFeed,
    P: ProxyProbe,
{
    feed: F,
    probe: P,
    config: ProxyPoolConfig,
    state: RwLock<PoolState>,
    // Serialises refreshes so concurrent callers never probe twice.
    refreshing: Mutex<()>,
}

impl<F, P> ProxyPool<F, P>
where
    F: ProxyFeed,
    P: ProxyProbe,
{
    pub fn new(feed: F, probe: P, mut config: ProxyPoolConfig) -> Self {
        // Fields are public, so the builder clamps may have been bypassed.
        config.size = config.size.max(1);
        config.batch_size = config.batch_size.max(1);
        config.concurrency = config.concurrency.max(1);
        Self {
            feed,
            probe,
            config,
            state: RwLock::new(PoolState::default()),
            refreshing: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    /// Refresh unless the pool is non-empty and younger than the refresh interval.
    pub async fn refresh(&self) -> Result<RefreshOutcome, AppError> {
        let _guard = self.refreshing.lock().await;
        if !self.is_stale().await {
            return Ok(RefreshOutcome::Skipped);
        }
        self.refresh_locked().await
    }

    /// Refresh regardless of the pool's age.
    pub async fn force_refresh(&self) -> Result<RefreshOutcome, AppError> {
        let _guard = self.refreshing.lock().await;
        self.refresh_locked().await
    }

    /// The lowest-latency proxy. A stale pool is refreshed first when no other
    /// refresh is in flight; either way the best known proxy is returned.
    pub async fn fastest(&self) -> Result<ProxyCandidate, AppError> {
        self.refresh_if_stale().await;
        let state = self.state.read().await;
        state.proxies.first().cloned().ok_or(AppError::NoProxies)
    }

    /// Up to `n` proxies, fastest first.
    pub async fn top(&self, n: usize) -> Vec<ProxyCandidate> {
        self.refresh_if_stale().await;
        let state = self.state.read().await;
        state.proxies.iter().take(n).cloned().collect()
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.read().await;
        let fastest = state.proxies.first();
        PoolStats {
            size: state.proxies.len(),
            last_refresh_age: state.last_refresh.map(|t| t.elapsed()),
            fastest: fastest.map(ProxyCandidate::to_string),
            fastest_latency: fastest.and_then(|p| p.latency),
        }
    }

    /// Refresh once immediately, then every refresh interval until cancelled.
    pub async fn run_refresh_loop(&self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = cancel_token.cancelled() => break,
            }

            match self.force_refresh().await {
                Ok(outcome) => {
                    tracing::debug!(?outcome, "Scheduled proxy refresh finished");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Scheduled proxy refresh found no proxies");
                }
            }
        }

        tracing::debug!("Proxy refresh loop stopped");
    }

    async fn is_stale(&self) -> bool {
        let state = self.state.read().await;
        if state.proxies.is_empty() {
            return true;
        }
        state
            .last_refresh
            .is_none_or(|t| t.elapsed() >= self.config.refresh_interval)
    }

    async fn refresh_if_stale(&self) {
        if !self.is_stale().await {
            return;
        }
        // Someone else is refreshing; serve what we have.
        let Ok(_guard) = self.refreshing.try_lock() else {
            return;
        };
        if !self.is_stale().await {
            return;
        }
        if let Err(e) = self.refresh_locked().await {
            tracing::debug!(error = %e, "Opportunistic proxy refresh failed");
        }
    }

    /// Caller must hold `self.refreshing`.
    async fn refresh_locked(&self) -> Result<RefreshOutcome, AppError> {
        let started = Instant::now();
        let candidates = self.collect_candidates().await;
        if candidates.is_empty() {
            tracing::warn!("No proxy candidates from any feed");
            return self.keep_previous().await;
        }

        let total = candidates.len();
        let mut working = self.probe_candidates(candidates).await;
        if working.is_empty() {
            tracing::warn!(candidates = total, "No working proxies found");
            return self.keep_previous().await;
        }

        working.sort_by_key(|p| p.latency.unwrap_or(Duration::MAX));
        working.truncate(self.config.size);
        let count = working.len();

        {
            let mut state = self.state.write().await;
            state.proxies = working;
            state.last_refresh = Some(Instant::now());
        }

        tracing::info!(
            candidates = total,
            working = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Proxy pool refreshed"
        );
        Ok(RefreshOutcome::Refreshed { count })
    }

    async fn keep_previous(&self) -> Result<RefreshOutcome, AppError> {
        let state = self.state.read().await;
        if state.proxies.is_empty() {
            Err(AppError::NoProxies)
        } else {
            Ok(RefreshOutcome::KeptPrevious)
        }
    }

    async fn collect_candidates(&self) -> Vec<ProxyCandidate> {
        for feed in &self.config.feeds {
            match self.feed.fetch_list(feed).await {
                Ok(body) if looks_like_html(&body) => {
                    tracing::debug!(%feed, "Proxy feed returned HTML, skipping");
                }
                Ok(body) => {
                    let candidates = parse_proxy_list(&body);
                    if candidates.is_empty() {
                        tracing::debug!(%feed, "Proxy feed had no usable entries");
                        continue;
                    }
                    tracing::debug!(%feed, count = candidates.len(), "Parsed proxy feed");
                    return candidates;
                }
                Err(e) => {
                    tracing::warn!(%feed, error = %e, "Proxy feed unavailable");
                }
            }
        }
        Vec::new()
    }

    /// Each probe owns its candidate; this loop is the single collector.
    async fn probe_candidates(&self, candidates: Vec<ProxyCandidate>) -> Vec<ProxyCandidate> {
        let threshold = self.config.early_stop_threshold();
        let probe = &self.probe;
        let mut working = Vec::new();

        for batch in candidates.chunks(self.config.batch_size) {
            let mut results = stream::iter(batch.to_vec())
                .map(|candidate| async move {
                    let latency = probe.probe(&candidate).await;
                    candidate.tested(latency)
                })
                .buffer_unordered(self.config.concurrency);

            while let Some(tested) = results.next().await {
                if !tested.working {
                    continue;
                }
                tracing::trace!(
                    proxy = %tested,
                    latency = ?tested.latency,
                    "Proxy working"
                );
                working.push(tested);
                if working.len() >= threshold {
                    return working;
                }
            }
        }

        working
    }
}

impl<F, P> ProxyProvider for ProxyPool<F, P>
where
    F: ProxyFeed,
    P: ProxyProbe,
{
    async fn refresh(&self) -> Result<RefreshOutcome, AppError> {
        ProxyPool::refresh(self).await
    }

    async fn fastest(&self) -> Result<ProxyCandidate, AppError> {
        ProxyPool::fastest(self).await
    }

    async fn top(&self, n: usize) -> Vec<ProxyCandidate> {
        ProxyPool::top(self, n).await
    }
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(16).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}
