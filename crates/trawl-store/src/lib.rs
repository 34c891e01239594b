pub mod cache;
pub mod config;
pub mod sink;

pub use cache::RedisTtlCache;
pub use config::RedisConfig;
pub use sink::RedisStreamSink;
