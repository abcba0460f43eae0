//! Queues: publishing, consumption and repatriation
//!
//! A queue handle is bound to one connection. Publishing needs nothing
//! but the store; consumption adds a fetcher task that moves payloads
//! from the ready list into this connection's unacked list and hands
//! them to consumer workers through a bounded in-process channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::RmqConfig;
use crate::connection::name_with_token;
use crate::delivery::{Consumer, Delivery};
use crate::error::{Result, RmqError};
use crate::keys;
use crate::store::Store;

/// A named queue bound to one connection
pub struct Queue {
    name: String,
    connection_name: String,
    queues_key: String,
    consumers_key: String,
    ready_key: String,
    unacked_key: String,
    store: Arc<dyn Store>,
    poll_timeout: Duration,
    consuming: Mutex<Option<Consuming>>,
}

struct Consuming {
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    deliveries: async_channel::Receiver<Delivery>,
    fetcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl Queue {
    pub(crate) fn new(
        name: &str,
        connection_name: &str,
        store: Arc<dyn Store>,
        config: &RmqConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            connection_name: connection_name.to_string(),
            queues_key: keys::connection_queues(connection_name),
            consumers_key: keys::connection_queue_consumers(connection_name, name),
            ready_key: keys::queue_ready(name),
            unacked_key: keys::connection_queue_unacked(connection_name, name),
            store,
            poll_timeout: config.fetch_poll_timeout,
            consuming: Mutex::new(None),
        }
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a payload to the queue's ready list
    pub async fn publish(&self, payload: &str) -> Result<()> {
        self.store.lpush(&self.ready_key, payload).await?;
        Ok(())
    }

    /// Publish opaque bytes. Payloads are strings end to end; invalid
    /// UTF-8 sequences are replaced.
    pub async fn publish_bytes(&self, payload: &[u8]) -> Result<()> {
        self.publish(&String::from_utf8_lossy(payload)).await
    }

    /// Delete the ready list; reports whether anything existed
    pub async fn purge(&self) -> Result<bool> {
        Ok(self.store.del(&self.ready_key).await? > 0)
    }

    /// Delete this connection's consumer set and unacked list, returning
    /// the number of unacked deliveries dropped. Destructive: dropped
    /// deliveries are gone, not redelivered.
    pub async fn clear(&self) -> Result<u64> {
        let dropped = self.store.llen(&self.unacked_key).await?;
        self.store.del(&self.consumers_key).await?;
        self.store.del(&self.unacked_key).await?;
        Ok(dropped as u64)
    }

    /// Number of payloads waiting in the ready list. Observability call:
    /// failures are logged and read as zero.
    pub async fn ready_count(&self) -> i64 {
        match self.store.llen(&self.ready_key).await {
            Ok(len) => len,
            Err(e) => {
                warn!("queue {} failed to get ready count: {}", self.name, e);
                0
            }
        }
    }

    /// Number of deliveries this connection holds in flight. Observability
    /// call: failures are logged and read as zero.
    pub async fn unacked_count(&self) -> i64 {
        match self.store.llen(&self.unacked_key).await {
            Ok(len) => len,
            Err(e) => {
                warn!("queue {} failed to get unacked count: {}", self.name, e);
                0
            }
        }
    }

    /// Names of the consumers registered on this (connection, queue).
    /// Observability call: failures are logged and read as empty.
    pub async fn get_consumers(&self) -> Vec<String> {
        match self.store.smembers(&self.consumers_key).await {
            Ok(members) => members,
            Err(e) => {
                warn!("queue {} failed to get consumers: {}", self.name, e);
                Vec::new()
            }
        }
    }

    /// Unregister a consumer by name; whether it was registered
    pub async fn remove_consumer(&self, name: &str) -> Result<bool> {
        Ok(self.store.srem(&self.consumers_key, name).await?)
    }

    /// Unregister every consumer; returns how many keys were deleted
    pub async fn remove_all_consumers(&self) -> Result<u64> {
        Ok(self.store.del(&self.consumers_key).await? as u64)
    }

    /// Put the queue into consuming mode with a delivery channel of
    /// capacity `buffer_size` (must be positive) and start the fetcher.
    pub async fn prepare_consumption(&self, buffer_size: usize) -> Result<()> {
        let mut consuming = self.consuming.lock().await;
        if consuming.is_some() {
            return Err(RmqError::AlreadyConsuming {
                queue: self.name.clone(),
            });
        }

        // Register the queue with its connection so a cleaner sweep can
        // find the unacked list if this process dies.
        self.store.sadd(&self.queues_key, &self.name).await?;

        let (tx, rx) = async_channel::bounded(buffer_size);
        let (stop_tx, stop_rx) = watch::channel(false);

        let fetcher = tokio::spawn(fetch_loop(
            self.name.clone(),
            self.store.clone(),
            self.ready_key.clone(),
            self.unacked_key.clone(),
            self.poll_timeout,
            tx,
            stop_rx.clone(),
        ));

        *consuming = Some(Consuming {
            stop_tx,
            stop_rx,
            deliveries: rx,
            fetcher,
            workers: Vec::new(),
        });

        info!(
            "queue {} started consuming for connection {}",
            self.name, self.connection_name
        );
        Ok(())
    }

    /// Register a consumer and start a worker draining the delivery
    /// channel into it. Returns the generated consumer name.
    ///
    /// # Panics
    ///
    /// Panics if [`prepare_consumption`](Queue::prepare_consumption) was
    /// not called first; that is a programming error, not a runtime
    /// condition.
    pub async fn add_consumer(&self, tag: &str, consumer: Arc<dyn Consumer>) -> Result<String> {
        let mut consuming = self.consuming.lock().await;
        let Some(state) = consuming.as_mut() else {
            panic!(
                "queue '{}' is not consuming; call prepare_consumption before add_consumer",
                self.name
            );
        };

        let name = name_with_token(tag);
        self.store.sadd(&self.consumers_key, &name).await?;

        state.workers.push(tokio::spawn(work_loop(
            name.clone(),
            consumer,
            state.deliveries.clone(),
            state.stop_rx.clone(),
        )));

        info!("queue {} added consumer {}", self.name, name);
        Ok(name)
    }

    /// Stop the fetcher and all consumer workers. Workers finish the
    /// delivery they are processing; everything fetched but undelivered
    /// is moved back to the ready list before this returns.
    pub async fn stop_consuming(&self) -> Result<()> {
        let state = self.consuming.lock().await.take();
        let Some(state) = state else {
            return Ok(());
        };

        let _ = state.stop_tx.send(true);
        join_task("fetcher", &self.name, state.fetcher).await;
        for worker in state.workers {
            join_task("consumer worker", &self.name, worker).await;
        }

        let returned = self.return_unacked_deliveries().await?;
        if returned > 0 {
            info!(
                "queue {} returned {} undelivered deliveries to ready",
                self.name, returned
            );
        }
        Ok(())
    }

    /// Move every element of this connection's unacked list back to the
    /// ready list, oldest-taken first, and assert the unacked list ends
    /// up empty.
    pub async fn return_unacked_deliveries(&self) -> Result<u64> {
        return_unacked(&self.store, &self.unacked_key, &self.ready_key).await
    }
}

/// Repatriate an unacked list into a ready list. Shared between orderly
/// stop and the cleaner, which applies it to dead connections' keys.
pub(crate) async fn return_unacked(
    store: &Arc<dyn Store>,
    unacked_key: &str,
    ready_key: &str,
) -> Result<u64> {
    let mut returned = 0u64;
    while store.rpoplpush(unacked_key, ready_key).await?.is_some() {
        returned += 1;
    }

    let remaining = store.llen(unacked_key).await?;
    if remaining != 0 {
        return Err(RmqError::UnackedRemain {
            key: unacked_key.to_string(),
            remaining,
        });
    }
    Ok(returned)
}

async fn fetch_loop(
    queue: String,
    store: Arc<dyn Store>,
    ready_key: String,
    unacked_key: String,
    poll_timeout: Duration,
    tx: async_channel::Sender<Delivery>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            popped = store.brpoplpush(&ready_key, &unacked_key, poll_timeout) => match popped {
                Ok(Some(payload)) => {
                    let delivery = Delivery::new(
                        payload,
                        unacked_key.clone(),
                        ready_key.clone(),
                        store.clone(),
                    );
                    // A full channel is the backpressure mechanism: wait
                    // here until a worker frees a slot or we are stopped.
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        sent = tx.send(delivery) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(None) => {} // poll slice elapsed, go around
                Err(e) => {
                    warn!("queue {} failed to fetch: {}", queue, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

async fn work_loop(
    name: String,
    consumer: Arc<dyn Consumer>,
    deliveries: async_channel::Receiver<Delivery>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            received = deliveries.recv() => match received {
                Ok(delivery) => consumer.consume(delivery).await,
                Err(_) => break, // channel closed and drained
            }
        }
    }
    info!("consumer {} stopped", name);
}

async fn join_task(kind: &str, queue: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!("queue {} {} task failed: {}", queue, kind, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Takes deliveries without settling them
    struct Sink;

    #[async_trait::async_trait]
    impl Consumer for Sink {
        async fn consume(&self, _delivery: Delivery) {}
    }

    fn test_queue(store: &Arc<MemoryStore>) -> Queue {
        Queue::new(
            "things",
            "conn-test01",
            store.clone() as Arc<dyn Store>,
            &RmqConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_publish_and_purge() {
        let store = Arc::new(MemoryStore::new());
        let queue = test_queue(&store);

        queue.publish("a").await.unwrap();
        queue.publish("b").await.unwrap();
        assert_eq!(queue.ready_count().await, 2);

        assert!(queue.purge().await.unwrap());
        assert_eq!(queue.ready_count().await, 0);
        assert!(!queue.purge().await.unwrap());

        queue.publish("c").await.unwrap();
        assert_eq!(queue.ready_count().await, 1);
    }

    #[tokio::test]
    async fn test_prepare_twice_fails() {
        let store = Arc::new(MemoryStore::new());
        let queue = test_queue(&store);

        queue.prepare_consumption(4).await.unwrap();
        assert!(matches!(
            queue.prepare_consumption(4).await,
            Err(RmqError::AlreadyConsuming { .. })
        ));
        queue.stop_consuming().await.unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "call prepare_consumption")]
    async fn test_add_consumer_requires_preparation() {
        let store = Arc::new(MemoryStore::new());
        let queue = test_queue(&store);
        let _ = queue.add_consumer("tag", Arc::new(Sink)).await;
    }

    #[tokio::test]
    async fn test_clear_drops_connection_state() {
        let store = Arc::new(MemoryStore::new());
        let queue = test_queue(&store);

        queue.publish("held").await.unwrap();
        queue.prepare_consumption(4).await.unwrap();
        queue.add_consumer("holder", Arc::new(Sink)).await.unwrap();

        // The payload is fetched into unacked and never settled.
        for _ in 0..200 {
            if queue.unacked_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.unacked_count().await, 1);
        assert_eq!(queue.get_consumers().await.len(), 1);

        assert_eq!(queue.clear().await.unwrap(), 1);

        let consumers = keys::connection_queue_consumers("conn-test01", "things");
        let unacked = keys::connection_queue_unacked("conn-test01", "things");
        assert!(!store.exists(&consumers).await.unwrap());
        assert!(!store.exists(&unacked).await.unwrap());
        assert_eq!(queue.ready_count().await, 0, "cleared, not redelivered");

        queue.stop_consuming().await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_registration_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let queue = test_queue(&store);

        queue.prepare_consumption(4).await.unwrap();
        let first = queue.add_consumer("alpha", Arc::new(Sink)).await.unwrap();
        let second = queue.add_consumer("beta", Arc::new(Sink)).await.unwrap();

        let mut names = queue.get_consumers().await;
        names.sort();
        let mut expected = vec![first.clone(), second.clone()];
        expected.sort();
        assert_eq!(names, expected);

        assert!(queue.remove_consumer(&first).await.unwrap());
        assert!(!queue.remove_consumer(&first).await.unwrap());
        assert_eq!(queue.get_consumers().await, vec![second]);

        assert_eq!(queue.remove_all_consumers().await.unwrap(), 1);
        assert!(queue.get_consumers().await.is_empty());

        queue.stop_consuming().await.unwrap();
    }

    #[tokio::test]
    async fn test_return_unacked_preserves_order() {
        let store = Arc::new(MemoryStore::new());
        let queue = test_queue(&store);

        // Simulate three fetched-but-unsettled deliveries, oldest first.
        let unacked = keys::connection_queue_unacked("conn-test01", "things");
        store.lpush(&unacked, "first").await.unwrap();
        store.lpush(&unacked, "second").await.unwrap();
        store.lpush(&unacked, "third").await.unwrap();

        assert_eq!(queue.return_unacked_deliveries().await.unwrap(), 3);
        assert_eq!(queue.unacked_count().await, 0);

        // Consumption order from ready must match the order taken.
        let ready = keys::queue_ready("things");
        assert_eq!(
            store.rpoplpush(&ready, "x").await.unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(
            store.rpoplpush(&ready, "x").await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(
            store.rpoplpush(&ready, "x").await.unwrap().as_deref(),
            Some("third")
        );
    }
}
