//! Tiered fetcher: an ordered chain of acquisition strategies.
//!
//! Each [`Tier`] either produces markup or explains why it could not. The
//! fetcher consults the rate-limit gate, walks the tiers in order and stops at
//! the first success. When every tier fails the source is put on cooldown so
//! the following cycles skip it without touching the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AppError, TierError, TierFailure};
use crate::gate::RateLimitGate;
use crate::models::SourceDescriptor;
use crate::traits::{Fetcher, TtlCache};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// What to fetch and how the source wants to be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source_id: String,
    pub url: String,
    pub requires_render: bool,
    /// Overrides the fetcher's default cooldown after exhaustion.
    pub cooldown: Option<Duration>,
}

impl FetchRequest {
    pub fn new(source_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            requires_render: false,
            cooldown: None,
        }
    }
}

impl From<&SourceDescriptor> for FetchRequest {
    fn from(source: &SourceDescriptor) -> Self {
        Self {
            source_id: source.id.clone(),
            url: source.url.clone(),
            requires_render: source.requires_render,
            cooldown: source.cooldown,
        }
    }
}

/// Markup produced by one of the tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub html: String,
    /// Name of the tier that produced it.
    pub tier: &'static str,
}

/// One strategy in the fallback chain.
#[async_trait]
pub trait Tier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this tier should run for `request` at all.
    fn applies_to(&self, request: &FetchRequest) -> bool {
        let _ = request;
        true
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<String, TierError>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Cooldown applied after exhaustion when the source has none of its own.
    pub default_cooldown: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            default_cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl FetcherConfig {
    pub fn with_default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }
}

#[derive(Clone)]
pub struct TieredFetcher<C: TtlCache> {
    gate: RateLimitGate<C>,
    tiers: Arc<Vec<Box<dyn Tier>>>,
    config: FetcherConfig,
}

impl<C: TtlCache> TieredFetcher<C> {
    pub fn new(gate: RateLimitGate<C>, tiers: Vec<Box<dyn Tier>>, config: FetcherConfig) -> Self {
        Self {
            gate,
            tiers: Arc::new(tiers),
            config,
        }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<Payload, AppError> {
        let source = request.source_id.as_str();
        if self.gate.is_blocked(source).await {
            return Err(AppError::RateLimited {
                source_id: source.to_string(),
            });
        }

        let mut attempts = Vec::new();
        for tier in self.tiers.iter() {
            let name = tier.name();
            if !tier.applies_to(request) {
                tracing::debug!(%source, tier = name, "Tier not applicable, skipping");
                continue;
            }

            let started = Instant::now();
            match tier.attempt(request).await {
                Ok(html) => {
                    tracing::info!(
                        %source,
                        tier = name,
                        bytes = html.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Fetched"
                    );
                    return Ok(Payload { html, tier: name });
                }
                Err(error) => {
                    if error.is_rate_limit() {
                        tracing::warn!(%source, tier = name, %error, "Tier rate limited");
                    } else {
                        tracing::debug!(%source, tier = name, %error, "Tier failed");
                    }
                    attempts.push(TierFailure { tier: name, error });
                }
            }
        }

        let cooldown = request.cooldown.unwrap_or(self.config.default_cooldown);
        if let Err(e) = self.gate.block(source, cooldown).await {
            tracing::warn!(%source, error = %e, "Failed to record cooldown");
        }

        Err(AppError::FetchExhausted {
            source_id: source.to_string(),
            attempts,
        })
    }
}

impl<C: TtlCache> Fetcher for TieredFetcher<C> {
    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, AppError> {
        TieredFetcher::fetch(self, request).await
    }
}
