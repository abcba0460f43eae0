//! Round-trip against a real Redis server.
//!
//! Ignored by default: run with `cargo test -- --ignored` against a
//! disposable server (`REDIS_URL`, default `redis://127.0.0.1:6379`).
//! The tests use throwaway queue names but do write `rmq::*` keys.

mod support;

use std::sync::Arc;

use rmq::{Connection, RedisStore, RmqConfig, Store};
use support::{Acker, Seen};

async fn redis_store() -> Arc<dyn Store> {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    Arc::new(
        RedisStore::connect(&url)
            .await
            .expect("redis server required for ignored tests"),
    )
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn redis_round_trip() {
    support::init_tracing();
    let store = redis_store().await;
    let connection = Connection::open("itest", store, RmqConfig::default())
        .await
        .unwrap();

    let queue_name = format!("itest-{}", std::process::id());
    let queue = connection.open_queue(&queue_name).await.unwrap();
    queue.purge().await.unwrap();

    for payload in ["a", "b", "c"] {
        queue.publish(payload).await.unwrap();
    }

    queue.prepare_consumption(8).await.unwrap();
    let seen = Seen::new();
    queue
        .add_consumer("worker", Arc::new(Acker { seen: seen.clone() }))
        .await
        .unwrap();

    seen.wait_for(3).await;
    assert_eq!(seen.items(), vec!["a", "b", "c"]);

    support::wait_for_counts(&queue, 0, 0).await;
    connection.close().await.unwrap();
}
