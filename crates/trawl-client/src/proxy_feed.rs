use std::time::Duration;

use reqwest::Client;
use trawl_core::error::AppError;
use trawl_core::traits::ProxyFeed;

const FEED_TIMEOUT: Duration = Duration::from_secs(30);
const FEED_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Downloads plaintext proxy lists over HTTP.
#[derive(Clone)]
pub struct HttpProxyFeed {
    client: Client,
}

impl HttpProxyFeed {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(FEED_USER_AGENT)
            .timeout(FEED_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ProxyFeed for HttpProxyFeed {
    async fn fetch_list(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(FEED_TIMEOUT.as_secs())
            } else {
                AppError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read proxy list: {e}")))
    }
}
