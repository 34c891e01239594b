//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{AppError, TierError};
use crate::fetcher::{FetchRequest, Tier};
use crate::models::{Record, SourceDescriptor};
use crate::proxy_list::ProxyCandidate;
use crate::proxy_pool::RefreshOutcome;
use crate::render::RenderStrategy;
use crate::traits::{
    BypassClient, Extractor, ProxyFeed, ProxyProbe, ProxyProvider, PublishSink, RenderClient,
    TtlCache,
};
use crate::worker::{WorkerEvent, WorkerReporter};

/// A working candidate on a fixed public address.
pub fn proxy(port: u16, latency_ms: u64) -> ProxyCandidate {
    ProxyCandidate::new(Ipv4Addr::new(45, 77, 12, 9), port, "US")
        .tested(Some(Duration::from_millis(latency_ms)))
}

// ---------------------------------------------------------------------------
// MockTtlCache
// ---------------------------------------------------------------------------

/// TTL cache on tokio's clock, so `tokio::time::advance` expires entries.
#[derive(Clone, Default)]
pub struct MockTtlCache {
    entries: Arc<Mutex<HashMap<String, (Vec<u8>, Instant)>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockTtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a cache error.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn check(&self) -> Result<(), AppError> {
        if *self.failing.lock().unwrap() {
            Err(AppError::CacheError("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl TtlCache for MockTtlCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let expired = matches!(entries.get(key), Some((_, at)) if Instant::now() >= *at);
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), AppError> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockSink {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    trims: Arc<Mutex<Vec<usize>>>,
    failures_left: Arc<Mutex<usize>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `n` publishes fail.
    pub fn failing_first(self, n: usize) -> Self {
        *self.failures_left.lock().unwrap() = n;
        self
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn trims(&self) -> Vec<usize> {
        self.trims.lock().unwrap().clone()
    }
}

impl PublishSink for MockSink {
    async fn publish(&self, record_key: &str, payload: &[u8]) -> Result<(), AppError> {
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(AppError::PublishError("stream unavailable".into()));
            }
        }
        self.published
            .lock()
            .unwrap()
            .push((record_key.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn trim_all(&self, max_len: usize) -> Result<(), AppError> {
        self.trims.lock().unwrap().push(max_len);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Emits a fixed number of records per source.
#[derive(Clone, Default)]
pub struct MockExtractor {
    counts: Arc<Mutex<HashMap<String, usize>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(self, source: &str, count: usize) -> Self {
        self.counts.lock().unwrap().insert(source.to_string(), count);
        self
    }

    pub fn with_error(self, source: &str) -> Self {
        self.failing.lock().unwrap().insert(source.to_string());
        self
    }
}

impl Extractor for MockExtractor {
    fn extract(&self, source: &SourceDescriptor, _html: &str) -> Result<Vec<Record>, AppError> {
        if self.failing.lock().unwrap().contains(&source.id) {
            return Err(AppError::ExtractError("listing container not found".into()));
        }
        let count = self
            .counts
            .lock()
            .unwrap()
            .get(&source.id)
            .copied()
            .unwrap_or(0);
        Ok((0..count)
            .map(|i| Record::new(&source.id, format!("item {i}"), format!("{}/{i}", source.url)))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// StubTier
// ---------------------------------------------------------------------------

type Responder = dyn Fn(&FetchRequest) -> Result<String, TierError> + Send + Sync;

#[derive(Clone)]
pub struct StubTier {
    name: &'static str,
    responder: Arc<Responder>,
    render_gated: bool,
    delay: Duration,
    calls: Arc<Mutex<usize>>,
}

impl StubTier {
    pub fn from_fn<Fun>(name: &'static str, f: Fun) -> Self
    where
        Fun: Fn(&FetchRequest) -> Result<String, TierError> + Send + Sync + 'static,
    {
        Self {
            name,
            responder: Arc::new(f),
            render_gated: false,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn ok(name: &'static str, html: &str) -> Self {
        let html = html.to_string();
        Self::from_fn(name, move |_| Ok(html.clone()))
    }

    pub fn failing(name: &'static str, error: TierError) -> Self {
        Self::from_fn(name, move |_| Err(error.clone()))
    }

    /// Skip requests for sources that require rendering.
    pub fn render_gated(mut self) -> Self {
        self.render_gated = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Tier for StubTier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn applies_to(&self, request: &FetchRequest) -> bool {
        !(self.render_gated && request.requires_render)
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<String, TierError> {
        *self.calls.lock().unwrap() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(request)
    }
}

// ---------------------------------------------------------------------------
// StubBypassClient / StubRenderClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StubBypassClient {
    responses: Arc<Mutex<VecDeque<Result<String, TierError>>>>,
    reachable: bool,
    calls: Arc<Mutex<Vec<Option<String>>>>,
}

impl StubBypassClient {
    pub fn new(responses: Vec<Result<String, TierError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            reachable: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Proxy used for each solve call, in order.
    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl BypassClient for StubBypassClient {
    async fn probe(&self) -> bool {
        self.reachable
    }

    async fn solve(&self, _url: &str, proxy: Option<&str>) -> Result<String, TierError> {
        self.calls.lock().unwrap().push(proxy.map(str::to_string));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TierError::Network("no scripted response".into())))
    }
}

#[derive(Clone)]
pub struct StubRenderClient {
    responses: Arc<Mutex<VecDeque<Result<String, TierError>>>>,
    reachable: bool,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl StubRenderClient {
    pub fn new(responses: Vec<Result<String, TierError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            reachable: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Strategy names, in the order they were tried.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl RenderClient for StubRenderClient {
    async fn probe(&self) -> Result<(), TierError> {
        if self.reachable {
            Ok(())
        } else {
            Err(TierError::Unavailable("render service returned 503".into()))
        }
    }

    async fn render(&self, _url: &str, strategy: &RenderStrategy) -> Result<String, TierError> {
        self.calls.lock().unwrap().push(strategy.name);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TierError::Network("no scripted response".into())))
    }
}

// ---------------------------------------------------------------------------
// Proxy pool collaborators
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct StubProxyFeed {
    bodies: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    gate: Option<Arc<Notify>>,
}

impl StubProxyFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: &str) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
        self
    }

    /// Park every fetch until `gate` hands out a permit.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProxyFeed for StubProxyFeed {
    async fn fetch_list(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::HttpError(format!("HTTP 503 from {url}")))
    }
}

/// Latency equals the port number in milliseconds, which makes ordering
/// assertions easy to read.
#[derive(Clone, Default)]
pub struct StubProbe {
    dead_ports: Arc<Mutex<HashSet<u16>>>,
    failing: Arc<Mutex<bool>>,
    calls: Arc<Mutex<usize>>,
}

impl StubProbe {
    pub fn latency_by_port() -> Self {
        Self::default()
    }

    pub fn with_dead_port(self, port: u16) -> Self {
        self.dead_ports.lock().unwrap().insert(port);
        self
    }

    /// Make every candidate fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ProxyProbe for StubProbe {
    async fn probe(&self, candidate: &ProxyCandidate) -> Option<Duration> {
        *self.calls.lock().unwrap() += 1;
        let dead = self.dead_ports.lock().unwrap().contains(&candidate.port);
        if dead || *self.failing.lock().unwrap() {
            return None;
        }
        Some(Duration::from_millis(u64::from(candidate.port)))
    }
}

/// Fixed proxy list standing in for a pool.
#[derive(Default)]
pub struct FakeProxyProvider {
    proxies: Vec<ProxyCandidate>,
    refresh_calls: Mutex<usize>,
}

impl FakeProxyProvider {
    pub fn new(proxies: Vec<ProxyCandidate>) -> Self {
        Self {
            proxies,
            refresh_calls: Mutex::new(0),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        *self.refresh_calls.lock().unwrap()
    }
}

impl ProxyProvider for FakeProxyProvider {
    async fn refresh(&self) -> Result<RefreshOutcome, AppError> {
        *self.refresh_calls.lock().unwrap() += 1;
        if self.proxies.is_empty() {
            Err(AppError::NoProxies)
        } else {
            Ok(RefreshOutcome::Skipped)
        }
    }

    async fn fastest(&self) -> Result<ProxyCandidate, AppError> {
        self.proxies.first().cloned().ok_or(AppError::NoProxies)
    }

    async fn top(&self, n: usize) -> Vec<ProxyCandidate> {
        self.proxies.iter().take(n).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Records worker events as short strings.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let line = match event {
            WorkerEvent::Started { .. } => "started".to_string(),
            WorkerEvent::CycleStarted { cycle, .. } => format!("cycle_started:{cycle}"),
            WorkerEvent::JobStarted { source } => format!("job_started:{source}"),
            WorkerEvent::JobCompleted {
                source,
                tier,
                published,
                ..
            } => format!("job_completed:{source}:{tier}:{published}"),
            WorkerEvent::JobFailed { source, kind, .. } => format!("job_failed:{source}:{kind}"),
            WorkerEvent::CycleCompleted { cycle, .. } => format!("cycle_completed:{cycle}"),
            WorkerEvent::ShuttingDown { .. } => "shutting_down".to_string(),
            WorkerEvent::Stopped { cycles, .. } => format!("stopped:{cycles}"),
        };
        self.events.lock().unwrap().push(line);
    }
}
