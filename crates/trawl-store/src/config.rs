use trawl_core::AppError;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_STREAM: &str = "trawl:records";

/// Connection and stream layout for the Redis backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
    /// Base stream name; shards are `{stream}:{index}`.
    pub stream: String,
    pub shards: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.into(),
            stream: DEFAULT_STREAM.into(),
            shards: 1,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.shards == 0 {
            return Err(AppError::ConfigError(
                "Stream shard count must be at least 1".into(),
            ));
        }
        if self.stream.trim().is_empty() {
            return Err(AppError::ConfigError("Stream name must not be empty".into()));
        }
        Ok(())
    }

    /// Names of every stream partition, in shard order.
    pub fn shard_names(&self) -> Vec<String> {
        if self.shards <= 1 {
            return vec![self.stream.clone()];
        }
        (0..self.shards)
            .map(|i| format!("{}:{i}", self.stream))
            .collect()
    }
}
