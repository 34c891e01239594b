use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use trawl_core::error::{AppError, TierError};
use trawl_core::fetcher::{FetchRequest, Tier};

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

const REFERERS: [&str; 3] = [
    "https://www.google.com/",
    "https://www.naver.com/",
    "https://www.daum.net/",
];

const ACCEPT_LANGUAGES: [&str; 2] = [
    "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7",
    "ko,en-US;q=0.9,en;q=0.8",
];

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Non-standard status some sites use for rate limiting.
const STATUS_430: u16 = 430;

/// Plain GET with rotating browser-like headers and no proxy.
#[derive(Clone)]
pub struct DirectTier {
    client: Client,
    timeout: Duration,
}

impl DirectTier {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self { client, timeout })
    }
}

fn pick(pool: &[&'static str]) -> HeaderValue {
    HeaderValue::from_static(pool.choose(&mut rand::rng()).copied().unwrap_or(pool[0]))
}

/// A fresh set of browser-like headers; every request looks a little different.
fn random_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, pick(&USER_AGENTS));
    headers.insert(header::REFERER, pick(&REFERERS));
    headers.insert(header::ACCEPT_LANGUAGE, pick(&ACCEPT_LANGUAGES));
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers
}

fn is_rate_limit_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == STATUS_430
}

#[async_trait]
impl Tier for DirectTier {
    fn name(&self) -> &'static str {
        "direct"
    }

    /// JS-gated sources never get a usable page from a plain GET.
    fn applies_to(&self, request: &FetchRequest) -> bool {
        !request.requires_render
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<String, TierError> {
        let response = self
            .client
            .get(&request.url)
            .headers(random_headers())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TierError::Timeout(self.timeout)
                } else {
                    TierError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if is_rate_limit_status(status) {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(TierError::RateLimited {
                status: status.as_u16(),
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(TierError::Network(format!("HTTP {}", status.as_u16())));
        }

        // Decodes according to the Content-Type charset.
        let body = response
            .text()
            .await
            .map_err(|e| TierError::Network(format!("Failed to read response body: {e}")))?;
        if body.trim().is_empty() {
            return Err(TierError::Unusable("empty body".into()));
        }
        Ok(body)
    }
}
