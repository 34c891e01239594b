mod sources;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use trawl_client::{
    BrowserlessClient, DirectTier, FlareSolverrClient, HttpProxyFeed, Socks5Probe,
};
use trawl_core::fetcher::Tier;
use trawl_core::traits::TtlCache;
use trawl_core::{
    BypassConfig, BypassTier, CrawlWorker, FetcherConfig, MokaTtlCache, ProxyPool,
    ProxyPoolConfig, RateLimitGate, RenderConfig, RenderTier, TieredFetcher,
    TracingWorkerReporter, WorkerConfig,
};
use trawl_store::{RedisConfig, RedisStreamSink, RedisTtlCache};

use crate::sources::{SourceSet, load_sources};

type SharedPool = Arc<ProxyPool<HttpProxyFeed, Socks5Probe>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CacheBackend {
    /// Shared Redis instance, so several workers see the same rate limits
    Redis,
    /// In-process cache, rate limits are private to this worker
    Memory,
}

#[derive(Parser)]
#[command(name = "trawl", version, about = "Resilient listing-page acquisition worker")]
struct Cli {
    /// Redis URL for the stream sink and the shared cache
    #[arg(long, env = "REDIS_URL", default_value = trawl_store::config::DEFAULT_REDIS_URL)]
    redis_url: String,

    /// Base stream name records are appended to
    #[arg(long, env = "TRAWL_STREAM", default_value = trawl_store::config::DEFAULT_STREAM)]
    stream: String,

    /// Number of stream partitions
    #[arg(long, env = "TRAWL_STREAM_SHARDS", default_value_t = 1)]
    stream_shards: usize,

    /// Approximate entry bound per partition, applied after each cycle
    #[arg(long, env = "TRAWL_STREAM_MAX_LEN", default_value_t = 500)]
    stream_max_len: usize,

    /// Where rate-limit blocks are kept
    #[arg(long, env = "TRAWL_CACHE", value_enum, default_value_t = CacheBackend::Redis)]
    cache: CacheBackend,

    /// Seconds between crawl cycles (at least 10)
    #[arg(long, env = "TRAWL_INTERVAL_SECS", default_value_t = 60)]
    interval_secs: u64,

    /// Challenge-bypass service base URL
    #[arg(long, env = "TRAWL_BYPASS_URL", default_value = "http://localhost:8191")]
    bypass_url: String,

    /// Headless-render service base URL
    #[arg(long, env = "TRAWL_RENDER_URL", default_value = "http://localhost:3000")]
    render_url: String,

    /// Seconds a source stays blocked after every tier failed
    #[arg(long, env = "TRAWL_COOLDOWN_SECS", default_value_t = 60)]
    cooldown_secs: u64,

    /// Number of working proxies to keep
    #[arg(long, default_value_t = 5)]
    pool_size: usize,

    /// Minutes between proxy pool refreshes
    #[arg(long, default_value_t = 30)]
    pool_refresh_mins: u64,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,

    /// Run a single cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

impl Cli {
    fn redis_config(&self) -> RedisConfig {
        RedisConfig::new(&self.redis_url)
            .with_stream(&self.stream)
            .with_shards(self.stream_shards)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let source_set = load_sources(|key| std::env::var(key).ok())
        .context("Invalid source configuration")?;

    let worker_config = WorkerConfig::default()
        .with_interval(Duration::from_secs(cli.interval_secs))
        .with_stream_max_len(cli.stream_max_len);
    worker_config
        .validate()
        .context("Invalid worker configuration")?;

    let sink = RedisStreamSink::connect(&cli.redis_config())
        .await
        .context("Failed to connect the stream sink")?;

    let pool_config = ProxyPoolConfig::default()
        .with_size(cli.pool_size)
        .with_refresh_interval(Duration::from_secs(cli.pool_refresh_mins * 60));
    let feed = HttpProxyFeed::new().context("Failed to create proxy feed client")?;
    let pool: SharedPool = Arc::new(ProxyPool::new(feed, Socks5Probe::new(), pool_config));

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel_token.clone()));

    if !cli.once {
        let pool = Arc::clone(&pool);
        let token = cancel_token.clone();
        tokio::spawn(async move { pool.run_refresh_loop(token).await });
    }

    match cli.cache {
        CacheBackend::Memory => {
            let cache = MokaTtlCache::new();
            run_with_cache(cache, &cli, pool, sink, source_set, worker_config, cancel_token).await
        }
        CacheBackend::Redis => {
            let cache = RedisTtlCache::connect(&cli.redis_url)
                .await
                .context("Failed to connect the rate-limit cache")?;
            run_with_cache(cache, &cli, pool, sink, source_set, worker_config, cancel_token).await
        }
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("trawl=info".parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Build the tier chain on top of `cache` and run the worker.
async fn run_with_cache<C>(
    cache: C,
    cli: &Cli,
    pool: SharedPool,
    sink: RedisStreamSink,
    source_set: SourceSet,
    worker_config: WorkerConfig,
    cancel_token: CancellationToken,
) -> Result<()>
where
    C: TtlCache + 'static,
{
    let tiers: Vec<Box<dyn Tier>> = vec![
        Box::new(DirectTier::new().context("Failed to create direct HTTP client")?),
        Box::new(BypassTier::new(
            FlareSolverrClient::new(&cli.bypass_url).context("Invalid bypass service URL")?,
            pool,
            BypassConfig::default(),
        )),
        Box::new(RenderTier::new(
            BrowserlessClient::new(&cli.render_url).context("Invalid render service URL")?,
            RenderConfig::default(),
        )),
    ];

    let fetcher = TieredFetcher::new(
        RateLimitGate::new(cache),
        tiers,
        FetcherConfig::default().with_default_cooldown(Duration::from_secs(cli.cooldown_secs)),
    );
    tracing::info!(tiers = ?fetcher.tier_names(), "Fetcher ready");

    let worker = CrawlWorker::new(
        fetcher,
        source_set.extractor,
        sink,
        source_set.sources,
        worker_config,
    );

    if cli.once {
        worker.run_cycle(&TracingWorkerReporter).await;
        return Ok(());
    }

    worker
        .run(cancel_token, &TracingWorkerReporter)
        .await
        .context("Worker stopped with an error")
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}
