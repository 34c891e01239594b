use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, ErrorKind};
use crate::fetcher::FetchRequest;
use crate::models::{CrawlCycleResult, SourceDescriptor};
use crate::traits::{Extractor, Fetcher, PublishSink};

/// Cycles may not run more often than this.
pub const MIN_CRAWL_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the crawl worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub interval: Duration,
    /// Per-partition bound passed to the sink after every cycle.
    pub stream_max_len: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            interval: Duration::from_secs(60),
            stream_max_len: 500,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stream_max_len(mut self, max_len: usize) -> Self {
        self.stream_max_len = max_len;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.interval < MIN_CRAWL_INTERVAL {
            return Err(AppError::ConfigError(format!(
                "crawl interval must be at least {}s, got {}s",
                MIN_CRAWL_INTERVAL.as_secs(),
                self.interval.as_secs()
            )));
        }
        if self.stream_max_len == 0 {
            return Err(AppError::ConfigError(
                "stream max length must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
        sources: usize,
        interval: Duration,
    },
    CycleStarted {
        cycle: u64,
        sources: usize,
    },
    JobStarted {
        source: &'a str,
    },
    JobCompleted {
        source: &'a str,
        tier: &'static str,
        extracted: usize,
        published: usize,
    },
    JobFailed {
        source: &'a str,
        error: &'a str,
        kind: ErrorKind,
    },
    CycleCompleted {
        cycle: u64,
        result: &'a CrawlCycleResult,
    },
    ShuttingDown {
        worker_id: &'a str,
    },
    Stopped {
        worker_id: &'a str,
        cycles: u64,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started {
                worker_id,
                sources,
                interval,
            } => {
                tracing::info!(
                    %worker_id,
                    sources,
                    interval_secs = interval.as_secs(),
                    "Worker started"
                );
            }
            WorkerEvent::CycleStarted { cycle, sources } => {
                tracing::debug!(cycle, sources, "Crawl cycle started");
            }
            WorkerEvent::JobStarted { source } => {
                tracing::debug!(%source, "Crawling source");
            }
            WorkerEvent::JobCompleted {
                source,
                tier,
                extracted,
                published,
            } => {
                tracing::info!(%source, tier, extracted, published, "Source crawled");
            }
            WorkerEvent::JobFailed {
                source,
                error,
                kind: ErrorKind::RateLimit,
            } => {
                tracing::info!(%source, %error, kind = "rate_limit", "Source skipped");
            }
            WorkerEvent::JobFailed {
                source,
                error,
                kind,
            } => {
                tracing::warn!(%source, %error, %kind, "Source failed");
            }
            WorkerEvent::CycleCompleted { cycle, result } => {
                tracing::info!(
                    cycle,
                    total_records = result.total_records,
                    successful = result.successful_sources,
                    failed = result.failed_sources,
                    duration_ms = result.duration.as_millis() as u64,
                    "Crawl cycle completed"
                );
            }
            WorkerEvent::ShuttingDown { worker_id } => {
                tracing::info!(%worker_id, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id, cycles } => {
                tracing::info!(%worker_id, cycles, "Worker stopped");
            }
        }
    }
}

/// Outcome of one successful source job.
#[derive(Debug)]
struct JobReport {
    tier: &'static str,
    extracted: usize,
    published: usize,
}

/// Runs one crawl cycle per interval over a fixed set of sources.
pub struct CrawlWorker<F, E, S>
where
    F: Fetcher,
    E: Extractor,
    S: PublishSink,
{
    fetcher: F,
    extractor: E,
    sink: S,
    sources: Vec<SourceDescriptor>,
    config: WorkerConfig,
    cycles: AtomicU64,
}

impl<F, E, S> CrawlWorker<F, E, S>
where
    F: Fetcher + 'static,
    E: Extractor + 'static,
    S: PublishSink + 'static,
{
    pub fn new(
        fetcher: F,
        extractor: E,
        sink: S,
        sources: Vec<SourceDescriptor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            sink,
            sources,
            config,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Run a cycle immediately and then once per interval until cancellation.
    ///
    /// Cancellation is only observed between cycles; a cycle in flight always
    /// runs to completion.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        self.config.validate()?;

        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
            sources: self.sources.len(),
            interval: self.config.interval,
        });

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.run_cycle(reporter).await;
        }

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
            cycles: self.cycles.load(Ordering::Relaxed),
        });

        Ok(())
    }

    /// Crawl every source concurrently, then bound the sink.
    pub async fn run_cycle<WR: WorkerReporter>(&self, reporter: &WR) -> CrawlCycleResult {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        reporter.report(WorkerEvent::CycleStarted {
            cycle,
            sources: self.sources.len(),
        });

        let mut jobs = JoinSet::new();
        for source in self.sources.iter() {
            reporter.report(WorkerEvent::JobStarted { source: &source.id });
            let (fetcher, extractor, sink) =
                (self.fetcher.clone(), self.extractor.clone(), self.sink.clone());
            let source = source.clone();
            jobs.spawn(async move {
                let outcome = crawl_source(&fetcher, &extractor, &sink, &source).await;
                (source.id, outcome)
            });
        }

        let mut result = CrawlCycleResult::default();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((source, Ok(report))) => {
                    result.successful_sources += 1;
                    result.total_records += report.published;
                    reporter.report(WorkerEvent::JobCompleted {
                        source: &source,
                        tier: report.tier,
                        extracted: report.extracted,
                        published: report.published,
                    });
                }
                Ok((source, Err(e))) => {
                    result.failed_sources += 1;
                    let error = e.to_string();
                    reporter.report(WorkerEvent::JobFailed {
                        source: &source,
                        error: &error,
                        kind: e.kind(),
                    });
                }
                Err(join_err) => {
                    result.failed_sources += 1;
                    tracing::error!(error = %join_err, "Crawl task aborted");
                }
            }
        }

        if let Err(e) = self.sink.trim_all(self.config.stream_max_len).await {
            tracing::warn!(error = %e, "Failed to trim streams");
        }

        result.duration = started.elapsed();
        reporter.report(WorkerEvent::CycleCompleted {
            cycle,
            result: &result,
        });
        result
    }
}

/// Fetch, extract and publish one source. Publish failures are logged and
/// skipped; fetch and extract failures fail the job.
async fn crawl_source<F, E, S>(
    fetcher: &F,
    extractor: &E,
    sink: &S,
    source: &SourceDescriptor,
) -> Result<JobReport, AppError>
where
    F: Fetcher,
    E: Extractor,
    S: PublishSink,
{
    let payload = fetcher.fetch(&FetchRequest::from(source)).await?;
    let records = extractor.extract(source, &payload.html)?;

    let mut published = 0;
    for record in &records {
        let bytes = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    source = %source.id,
                    record_id = %record.id,
                    error = %e,
                    "Failed to serialize record"
                );
                continue;
            }
        };
        match sink.publish(&record.id, &bytes).await {
            Ok(()) => published += 1,
            Err(e) => {
                tracing::warn!(
                    source = %source.id,
                    record_id = %record.id,
                    error = %e,
                    "Failed to publish record"
                );
            }
        }
    }

    Ok(JobReport {
        tier: payload.tier,
        extracted: records.len(),
        published,
    })
}
