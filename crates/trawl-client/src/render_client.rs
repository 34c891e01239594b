use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use trawl_core::error::{AppError, TierError};
use trawl_core::render::{RenderMode, RenderStrategy};
use trawl_core::traits::RenderClient;
use url::Url;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Slack on top of the navigation timeout handed to the service.
const REQUEST_SLACK: Duration = Duration::from_secs(5);

/// Fields some deployments wrap the page markup in.
const WRAPPER_FIELDS: [&str; 3] = ["data", "result", "content"];

/// Client for a browserless-style headless rendering service.
#[derive(Clone)]
pub struct BrowserlessClient {
    client: Client,
    base_url: String,
}

impl BrowserlessClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid render URL '{base_url}': {e}")))?;

        let client = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_request(
        &self,
        url: &str,
        strategy: &RenderStrategy,
    ) -> Result<RequestBuilder, TierError> {
        let request = match strategy.mode {
            RenderMode::Content { wait_until } => self
                .client
                .post(format!("{}/content", self.base_url))
                .json(&json!({
                    "url": url,
                    "gotoOptions": {
                        "waitUntil": wait_until.as_str(),
                        "timeout": strategy.timeout.as_millis() as u64,
                    }
                })),
            RenderMode::Scrape => {
                let endpoint = Url::parse_with_params(
                    &format!("{}/scrape", self.base_url),
                    &[("url", url)],
                )
                .map_err(|e| TierError::Network(format!("invalid scrape URL: {e}")))?;
                self.client.get(endpoint)
            }
        };
        Ok(request.timeout(strategy.timeout + REQUEST_SLACK))
    }
}

impl RenderClient for BrowserlessClient {
    async fn probe(&self) -> Result<(), TierError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| TierError::Unavailable(format!("render service unreachable: {e}")))?;

        if response.status().is_server_error() {
            return Err(TierError::Unavailable(format!(
                "render service returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn render(&self, url: &str, strategy: &RenderStrategy) -> Result<String, TierError> {
        let response = self
            .build_request(url, strategy)?
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TierError::Timeout(strategy.timeout)
                } else {
                    TierError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TierError::Network(format!(
                "{} returned HTTP {}",
                strategy.name,
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TierError::Network(format!("Failed to read render body: {e}")))?;
        Ok(unwrap_json(body))
    }
}

/// Pull markup out of a JSON envelope; anything else is returned as is.
fn unwrap_json(body: String) -> String {
    if !body.trim_start().starts_with('{') {
        return body;
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) else {
        return body;
    };
    WRAPPER_FIELDS
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or(body)
}
