//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rmq::{Consumer, Delivery, Queue};

const POLL: Duration = Duration::from_millis(25);
const POLL_ROUNDS: usize = 400; // 10 seconds

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Thread-safe record of the payloads a consumer has seen
#[derive(Clone, Default)]
pub struct Seen {
    items: Arc<Mutex<Vec<String>>>,
}

impl Seen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: &str) {
        self.items.lock().unwrap().push(item.to_string());
    }

    pub fn items(&self) -> Vec<String> {
        self.items.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Poll until at least `count` payloads were seen
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..POLL_ROUNDS {
            if self.len() >= count {
                return;
            }
            tokio::time::sleep(POLL).await;
        }
        panic!(
            "timed out waiting for {} deliveries, saw {:?}",
            count,
            self.items()
        );
    }
}

/// Poll until the queue's ready and unacked counters match
pub async fn wait_for_counts(queue: &Queue, ready: i64, unacked: i64) {
    for _ in 0..POLL_ROUNDS {
        if queue.ready_count().await == ready && queue.unacked_count().await == unacked {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!(
        "timed out waiting for ready={} unacked={}; got ready={} unacked={}",
        ready,
        unacked,
        queue.ready_count().await,
        queue.unacked_count().await
    );
}

/// Acknowledges every delivery immediately
pub struct Acker {
    pub seen: Seen,
}

#[async_trait::async_trait]
impl Consumer for Acker {
    async fn consume(&self, delivery: Delivery) {
        self.seen.push(delivery.payload());
        delivery.ack().await.expect("ack failed");
    }
}

/// Rejects on the first attempt, acks on the second, and so on
pub struct FlipFlop {
    pub seen: Seen,
    attempts: AtomicUsize,
}

impl FlipFlop {
    pub fn new(seen: Seen) -> Self {
        Self {
            seen,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Consumer for FlipFlop {
    async fn consume(&self, delivery: Delivery) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.seen.push(delivery.payload());
        if attempt % 2 == 0 {
            delivery.reject().await.expect("reject failed");
        } else {
            delivery.ack().await.expect("ack failed");
        }
    }
}

/// Sleeps before acknowledging, to keep a delivery in flight
pub struct SlowAcker {
    pub seen: Seen,
    pub delay: Duration,
}

#[async_trait::async_trait]
impl Consumer for SlowAcker {
    async fn consume(&self, delivery: Delivery) {
        self.seen.push(delivery.payload());
        tokio::time::sleep(self.delay).await;
        delivery.ack().await.expect("ack failed");
    }
}

/// Blocks on a semaphore before acknowledging; lets a test hold the
/// pipeline full until it releases permits
pub struct Gated {
    pub seen: Seen,
    pub gate: Arc<tokio::sync::Semaphore>,
}

#[async_trait::async_trait]
impl Consumer for Gated {
    async fn consume(&self, delivery: Delivery) {
        self.seen.push(delivery.payload());
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        delivery.ack().await.expect("ack failed");
    }
}

/// Takes deliveries but never settles them
pub struct NeverSettles {
    pub seen: Seen,
}

#[async_trait::async_trait]
impl Consumer for NeverSettles {
    async fn consume(&self, delivery: Delivery) {
        self.seen.push(delivery.payload());
    }
}
