use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use redis::aio::ConnectionManager;
use trawl_core::AppError;
use trawl_core::traits::PublishSink;

use crate::config::RedisConfig;

/// Appends records to one or more Redis streams, rotating across shards.
#[derive(Clone)]
pub struct RedisStreamSink {
    conn: ConnectionManager,
    shards: Arc<Vec<String>>,
    next: Arc<AtomicUsize>,
}

impl RedisStreamSink {
    pub async fn connect(config: &RedisConfig) -> Result<Self, AppError> {
        config.validate()?;
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| AppError::ConfigError(format!("Invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::PublishError(format!("Redis connection failed: {e}")))?;
        Ok(Self::from_manager(conn, config))
    }

    pub fn from_manager(conn: ConnectionManager, config: &RedisConfig) -> Self {
        Self {
            conn,
            shards: Arc::new(config.shard_names()),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn shards(&self) -> &[String] {
        &self.shards
    }

    fn next_shard(&self) -> &str {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        &self.shards[index]
    }
}

impl PublishSink for RedisStreamSink {
    async fn publish(&self, record_key: &str, payload: &[u8]) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let stream = self.next_shard();

        let entry_id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("key")
            .arg(record_key)
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::PublishError(format!("XADD {stream} failed: {e}")))?;

        tracing::trace!(
            stream = %stream,
            entry_id = %entry_id,
            key = record_key,
            "Published record"
        );
        Ok(())
    }

    async fn trim_all(&self, max_len: usize) -> Result<(), AppError> {
        let conn = self.conn.clone();
        trim_each(&self.shards, |stream| {
            let mut conn = conn.clone();
            async move {
                redis::cmd("XTRIM")
                    .arg(&stream)
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(max_len)
                    .query_async::<u64>(&mut conn)
                    .await
                    .map_err(|e| AppError::PublishError(format!("XTRIM {stream} failed: {e}")))
            }
        })
        .await
    }
}

/// Trim every shard even when some fail; the first failure is returned once
/// all shards have been visited.
async fn trim_each<F, Fut>(shards: &[String], mut trim: F) -> Result<(), AppError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<u64, AppError>>,
{
    let mut first_error = None;
    for shard in shards {
        match trim(shard.clone()).await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::debug!(shard = %shard, removed, "Trimmed stream");
            }
            Err(e) => {
                tracing::warn!(shard = %shard, error = %e, "Failed to trim stream");
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
