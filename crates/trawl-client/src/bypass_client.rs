use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use trawl_core::error::{AppError, TierError};
use trawl_core::traits::BypassClient;
use url::Url;

const SOLVE_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Budget the service gets for solving one challenge, in milliseconds.
const MAX_TIMEOUT_MS: u64 = 20_000;

#[derive(Serialize)]
struct SolveRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<ProxySpec<'a>>,
}

#[derive(Serialize)]
struct ProxySpec<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct SolveResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<Solution>,
}

#[derive(Deserialize)]
struct Solution {
    #[serde(default)]
    response: String,
}

/// Client for a FlareSolverr-compatible challenge solver.
#[derive(Clone)]
pub struct FlareSolverrClient {
    client: Client,
    base_url: String,
}

impl FlareSolverrClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid bypass URL '{base_url}': {e}")))?;

        let client = Client::builder()
            .timeout(SOLVE_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl BypassClient for FlareSolverrClient {
    async fn probe(&self) -> bool {
        match self
            .client
            .get(&self.base_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.base_url, error = %e, "Bypass service unreachable");
                false
            }
        }
    }

    async fn solve(&self, url: &str, proxy: Option<&str>) -> Result<String, TierError> {
        let body = SolveRequest {
            cmd: "request.get",
            url,
            max_timeout: MAX_TIMEOUT_MS,
            proxy: proxy.map(|url| ProxySpec { url }),
        };

        let response = self
            .client
            .post(format!("{}/v1", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TierError::Timeout(SOLVE_TIMEOUT)
                } else {
                    TierError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TierError::Network(format!(
                "bypass service returned HTTP {}",
                status.as_u16()
            )));
        }

        let solved: SolveResponse = response
            .json()
            .await
            .map_err(|e| TierError::Unusable(format!("malformed bypass response: {e}")))?;

        if solved.status != "ok" {
            return Err(TierError::Unusable(format!(
                "bypass status '{}': {}",
                solved.status, solved.message
            )));
        }

        match solved.solution {
            Some(solution) if !solution.response.is_empty() => Ok(solution.response),
            _ => Err(TierError::Unusable("empty solution".into())),
        }
    }
}
