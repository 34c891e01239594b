use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for trawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport-level failure (connect, reset, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Non-success HTTP status or malformed HTTP exchange.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The source is inside its cooldown window; no request was made.
    #[error("Source '{source_id}' is rate limited")]
    RateLimited { source_id: String },

    /// Every tier of the fetch chain failed for a source.
    #[error("All fetch tiers failed for '{source_id}': {}", format_attempts(.attempts))]
    FetchExhausted {
        source_id: String,
        attempts: Vec<TierFailure>,
    },

    /// The extractor could not turn a payload into records.
    #[error("Extract error: {0}")]
    ExtractError(String),

    /// The downstream sink rejected a record or a trim.
    #[error("Publish error: {0}")]
    PublishError(String),

    /// The TTL cache backing the rate-limit gate is unavailable.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// The proxy pool has never been populated.
    #[error("No working proxies available")]
    NoProxies,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Coarse error class used for structured logging of job failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    RateLimit,
    Render,
    Exhaustion,
    Extract,
    Publish,
    Cache,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Render => "render",
            ErrorKind::Exhaustion => "exhaustion",
            ErrorKind::Extract => "extract",
            ErrorKind::Publish => "publish",
            ErrorKind::Cache => "cache",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NetworkError(_) | AppError::HttpError(_) | AppError::Timeout(_) => {
                ErrorKind::Network
            }
            AppError::RateLimited { .. } => ErrorKind::RateLimit,
            AppError::FetchExhausted { .. } => ErrorKind::Exhaustion,
            AppError::ExtractError(_) | AppError::SerializationError(_) => ErrorKind::Extract,
            AppError::PublishError(_) => ErrorKind::Publish,
            AppError::CacheError(_) => ErrorKind::Cache,
            AppError::NoProxies => ErrorKind::Network,
            AppError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Returns true if this error is transient and worth retrying in a later cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::NoProxies => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

/// Failure of a single tier of the fetch chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierError {
    /// Transport failure or non-success status.
    #[error("network: {0}")]
    Network(String),

    /// The upstream answered with a 429-class status.
    #[error("rate limited (HTTP {status}{})", retry_after_suffix(.retry_after))]
    RateLimited {
        status: u16,
        retry_after: Option<String>,
    },

    /// A payload arrived but is not usable markup.
    #[error("unusable payload: {0}")]
    Unusable(String),

    /// The backing service (bypass, render) is not reachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The tier gave up after its own timeout.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl TierError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, TierError::RateLimited { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TierError::Network(_) | TierError::Unavailable(_) | TierError::Timeout(_) => {
                ErrorKind::Network
            }
            TierError::RateLimited { .. } => ErrorKind::RateLimit,
            TierError::Unusable(_) => ErrorKind::Render,
        }
    }
}

/// A tier name paired with the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
    pub tier: &'static str,
    pub error: TierError,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.error)
    }
}

fn format_attempts(attempts: &[TierFailure]) -> String {
    if attempts.is_empty() {
        return "no tier applied".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn retry_after_suffix(retry_after: &Option<String>) -> String {
    match retry_after {
        Some(value) => format!(", retry after {value}"),
        None => String::new(),
    }
}
