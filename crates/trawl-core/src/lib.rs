pub mod bypass;
pub mod cache;
pub mod error;
pub mod fetcher;
pub mod gate;
pub mod models;
pub mod proxy_list;
pub mod proxy_pool;
pub mod render;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use bypass::{BypassConfig, BypassTier};
pub use cache::MokaTtlCache;
pub use error::{AppError, ErrorKind, TierError, TierFailure};
pub use fetcher::{FetchRequest, FetcherConfig, Payload, Tier, TieredFetcher};
pub use gate::RateLimitGate;
pub use models::{CrawlCycleResult, Record, SourceDescriptor, compute_hash};
pub use proxy_list::{ProxyCandidate, parse_proxy_list};
pub use proxy_pool::{PoolStats, ProxyPool, ProxyPoolConfig, RefreshOutcome};
pub use render::{RenderConfig, RenderMode, RenderStrategy, RenderTier, WaitUntil};
pub use traits::{
    BypassClient, Extractor, Fetcher, ProxyFeed, ProxyProbe, ProxyProvider, PublishSink,
    RenderClient, TtlCache,
};
pub use worker::{CrawlWorker, TracingWorkerReporter, WorkerConfig, WorkerReporter};
