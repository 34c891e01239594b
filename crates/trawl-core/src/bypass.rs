//! Challenge-bypass tier with proxy rotation.
//!
//! Order of attempts: no proxy, then the pool's fastest proxy after a
//! refresh, then the remaining proxies of the pool's top few.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TierError;
use crate::fetcher::{FetchRequest, Tier};
use crate::traits::{BypassClient, ProxyProvider};

#[derive(Debug, Clone)]
pub struct BypassConfig {
    /// How many of the pool's best proxies to try after the fastest one.
    pub proxy_attempts: usize,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self { proxy_attempts: 3 }
    }
}

impl BypassConfig {
    pub fn with_proxy_attempts(mut self, attempts: usize) -> Self {
        self.proxy_attempts = attempts;
        self
    }
}

pub struct BypassTier<B, P> {
    client: B,
    proxies: Arc<P>,
    config: BypassConfig,
}

impl<B, P> BypassTier<B, P>
where
    B: BypassClient,
    P: ProxyProvider,
{
    pub fn new(client: B, proxies: Arc<P>, config: BypassConfig) -> Self {
        Self {
            client,
            proxies,
            config,
        }
    }

    async fn solve_via(
        &self,
        request: &FetchRequest,
        proxy: Option<&str>,
    ) -> Result<String, TierError> {
        let result = self.client.solve(&request.url, proxy).await;
        match &result {
            Ok(_) => {
                tracing::info!(
                    source = %request.source_id,
                    proxy = proxy.unwrap_or("none"),
                    "Challenge solved"
                );
            }
            Err(error) => {
                tracing::debug!(
                    source = %request.source_id,
                    proxy = proxy.unwrap_or("none"),
                    %error,
                    "Challenge bypass failed"
                );
            }
        }
        result
    }
}

#[async_trait]
impl<B, P> Tier for BypassTier<B, P>
where
    B: BypassClient,
    P: ProxyProvider,
{
    fn name(&self) -> &'static str {
        "bypass"
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<String, TierError> {
        if !self.client.probe().await {
            return Err(TierError::Unavailable("bypass service unreachable".into()));
        }

        let mut last_error = match self.solve_via(request, None).await {
            Ok(html) => return Ok(html),
            Err(e) => e,
        };

        if let Err(e) = self.proxies.refresh().await {
            tracing::debug!(error = %e, "Proxy refresh before bypass retry failed");
        }

        let fastest = match self.proxies.fastest().await {
            Ok(proxy) => proxy,
            Err(e) => {
                tracing::debug!(
                    source = %request.source_id,
                    error = %e,
                    "No proxy for bypass retry"
                );
                return Err(last_error);
            }
        };

        match self.solve_via(request, Some(&fastest.url())).await {
            Ok(html) => return Ok(html),
            Err(e) => last_error = e,
        }

        let others = self.proxies.top(self.config.proxy_attempts).await;
        for proxy in others.iter().filter(|p| p.addr() != fastest.addr()) {
            match self.solve_via(request, Some(&proxy.url())).await {
                Ok(html) => return Ok(html),
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}
