use std::time::Duration;

use async_trait::async_trait;

use crate::error::TierError;
use crate::fetcher::{FetchRequest, Tier};
use crate::traits::RenderClient;

/// Minimum size of a rendered response worth parsing.
const MIN_MARKUP_LEN: usize = 50;

/// Page lifecycle event the render service waits for before snapshotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    NetworkIdle,
    Load,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::NetworkIdle => "networkidle0",
            WaitUntil::Load => "load",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Full page content after navigation.
    Content { wait_until: WaitUntil },
    /// Plain scrape endpoint.
    Scrape,
}

/// One way of asking the render service for a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderStrategy {
    pub name: &'static str,
    pub mode: RenderMode,
    pub timeout: Duration,
}

impl RenderStrategy {
    pub fn network_idle() -> Self {
        Self {
            name: "networkidle-content",
            mode: RenderMode::Content {
                wait_until: WaitUntil::NetworkIdle,
            },
            timeout: Duration::from_secs(45),
        }
    }

    pub fn basic_content() -> Self {
        Self {
            name: "basic-content",
            mode: RenderMode::Content {
                wait_until: WaitUntil::Load,
            },
            timeout: Duration::from_secs(20),
        }
    }

    pub fn scrape_fallback() -> Self {
        Self {
            name: "scrape-fallback",
            mode: RenderMode::Scrape,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub strategies: Vec<RenderStrategy>,
    /// Pause between two strategies.
    pub strategy_delay: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                RenderStrategy::network_idle(),
                RenderStrategy::basic_content(),
                RenderStrategy::scrape_fallback(),
            ],
            strategy_delay: Duration::from_secs(1),
        }
    }
}

impl RenderConfig {
    pub fn with_strategies(mut self, strategies: Vec<RenderStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_strategy_delay(mut self, delay: Duration) -> Self {
        self.strategy_delay = delay;
        self
    }
}

/// Headless-render tier: probe, then walk the strategies until one returns markup.
pub struct RenderTier<R> {
    client: R,
    config: RenderConfig,
}

impl<R: RenderClient> RenderTier<R> {
    pub fn new(client: R, config: RenderConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl<R: RenderClient> Tier for RenderTier<R> {
    fn name(&self) -> &'static str {
        "render"
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<String, TierError> {
        self.client.probe().await?;

        let mut last_error = TierError::Unusable("no render strategy configured".into());
        for (i, strategy) in self.config.strategies.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.strategy_delay).await;
            }

            match self.client.render(&request.url, strategy).await {
                Ok(body) if looks_like_markup(&body) => {
                    tracing::info!(
                        source = %request.source_id,
                        strategy = strategy.name,
                        bytes = body.len(),
                        "Render strategy succeeded"
                    );
                    return Ok(body);
                }
                Ok(body) => {
                    tracing::debug!(
                        source = %request.source_id,
                        strategy = strategy.name,
                        bytes = body.len(),
                        "Render returned no markup"
                    );
                    last_error = TierError::Unusable(format!(
                        "{} returned {} bytes without markup",
                        strategy.name,
                        body.len()
                    ));
                }
                Err(error) => {
                    tracing::debug!(
                        source = %request.source_id,
                        strategy = strategy.name,
                        %error,
                        "Render strategy failed"
                    );
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}

/// True when `body` is long enough and carries an HTML marker.
pub fn looks_like_markup(body: &str) -> bool {
    if body.len() < MIN_MARKUP_LEN {
        return false;
    }
    let lower = body.to_ascii_lowercase();
    lower.contains("<html") || lower.contains("<!doctype") || lower.contains("<body")
}
