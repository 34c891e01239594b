use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use trawl_core::AppError;
use trawl_core::traits::TtlCache;

/// [`TtlCache`] over plain Redis strings with `SET EX`.
#[derive(Clone)]
pub struct RedisTtlCache {
    conn: ConnectionManager,
}

impl RedisTtlCache {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::ConfigError(format!("Invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::CacheError(format!("Redis connection failed: {e}")))?;
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

/// Redis expiry granularity is one second; shorter TTLs round up.
fn ttl_secs(ttl: Duration) -> u64 {
    (ttl.as_millis().div_ceil(1000) as u64).max(1)
}

impl TtlCache for RedisTtlCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| AppError::CacheError(format!("GET {key} failed: {e}")))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
            .await
            .map_err(|e| AppError::CacheError(format!("SET {key} failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::CacheError(format!("DEL {key} failed: {e}")))
    }
}
