use std::time::Duration;

use redis::AsyncCommands;
use redis::streams::StreamRangeReply;
use trawl_core::traits::{PublishSink, TtlCache};
use trawl_store::{RedisConfig, RedisStreamSink, RedisTtlCache};

use crate::common::setup_test_redis;

async fn stream_len(conn: &mut redis::aio::ConnectionManager, stream: &str) -> u64 {
    redis::cmd("XLEN")
        .arg(stream)
        .query_async(conn)
        .await
        .expect("XLEN failed")
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn cache_set_get_delete() {
    let (_url, conn, _container) = setup_test_redis().await;
    let cache = RedisTtlCache::from_manager(conn);

    assert_eq!(cache.get("ratelimit:ppomppu").await.unwrap(), None);

    cache
        .set("ratelimit:ppomppu", b"60", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        cache.get("ratelimit:ppomppu").await.unwrap(),
        Some(b"60".to_vec())
    );

    cache.delete("ratelimit:ppomppu").await.unwrap();
    assert_eq!(cache.get("ratelimit:ppomppu").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn cache_entry_expires() {
    let (_url, conn, _container) = setup_test_redis().await;
    let cache = RedisTtlCache::from_manager(conn);

    cache
        .set("ratelimit:clien", b"1", Duration::from_secs(1))
        .await
        .unwrap();
    assert!(cache.get("ratelimit:clien").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(cache.get("ratelimit:clien").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn connect_from_url() {
    let (url, _conn, _container) = setup_test_redis().await;
    let cache = RedisTtlCache::connect(&url).await.unwrap();
    cache.set("k", b"v", Duration::from_secs(5)).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn sink_rotates_across_shards() {
    let (_url, mut conn, _container) = setup_test_redis().await;
    let config = RedisConfig::default().with_stream("deals").with_shards(3);
    let sink = RedisStreamSink::from_manager(conn.clone(), &config);

    for i in 0..7 {
        sink.publish(&format!("record-{i}"), b"{\"title\":\"x\"}")
            .await
            .unwrap();
    }

    assert_eq!(stream_len(&mut conn, "deals:0").await, 3);
    assert_eq!(stream_len(&mut conn, "deals:1").await, 2);
    assert_eq!(stream_len(&mut conn, "deals:2").await, 2);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn sink_entry_carries_key_and_payload() {
    let (_url, mut conn, _container) = setup_test_redis().await;
    let sink = RedisStreamSink::from_manager(conn.clone(), &RedisConfig::default());

    sink.publish("abc123", b"{\"title\":\"SSD\"}").await.unwrap();

    let reply: StreamRangeReply = conn.xrange_all("trawl:records").await.unwrap();
    assert_eq!(reply.ids.len(), 1);
    let entry = &reply.ids[0];
    assert_eq!(entry.get::<String>("key").as_deref(), Some("abc123"));
    assert_eq!(
        entry.get::<String>("payload").as_deref(),
        Some("{\"title\":\"SSD\"}")
    );
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn trim_all_bounds_every_shard() {
    let (_url, mut conn, _container) = setup_test_redis().await;
    let config = RedisConfig::default().with_stream("bounded").with_shards(2);
    let sink = RedisStreamSink::from_manager(conn.clone(), &config);

    for i in 0..1000 {
        sink.publish(&format!("r{i}"), b"{}").await.unwrap();
    }
    sink.trim_all(100).await.unwrap();

    // Approximate trimming only removes whole macro nodes.
    for stream in sink.shards() {
        let len = stream_len(&mut conn, stream).await;
        assert!(len < 500, "{stream} still holds {len} entries");
        assert!(len >= 100, "{stream} trimmed below bound: {len}");
    }
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn trim_all_continues_past_a_failing_shard() {
    let (_url, mut conn, _container) = setup_test_redis().await;
    let config = RedisConfig::default().with_stream("mixed").with_shards(2);
    let sink = RedisStreamSink::from_manager(conn.clone(), &config);

    // mixed:0 holds a plain string, so XTRIM on it fails with WRONGTYPE.
    let _: () = conn.set("mixed:0", "not a stream").await.unwrap();
    for i in 0..400 {
        let _: String = redis::cmd("XADD")
            .arg("mixed:1")
            .arg("*")
            .arg("key")
            .arg(format!("r{i}"))
            .query_async(&mut conn)
            .await
            .unwrap();
    }

    let result = sink.trim_all(10).await;

    assert!(result.unwrap_err().to_string().contains("mixed:0"));
    let len = stream_len(&mut conn, "mixed:1").await;
    assert!(len < 400, "mixed:1 was not trimmed: {len}");
}
