//! Connections: identity, liveness and queue lifecycle
//!
//! A connection is one host process's identity in the store. It owns a
//! heartbeat task whose key expiring is the system-wide signal that the
//! process died and its unacked deliveries are up for repatriation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::RmqConfig;
use crate::error::Result;
use crate::keys;
use crate::queue::Queue;
use crate::store::Store;

/// Generate a `tag-XXXXXX` name with a random 6-character token, so
/// restarts of the same process are distinguishable.
pub(crate) fn name_with_token(tag: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", tag, &token[..6])
}

/// A registered, heartbeating host-process identity
pub struct Connection {
    name: String,
    store: Arc<dyn Store>,
    config: RmqConfig,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    heartbeat: Mutex<Option<Heartbeat>>,
}

struct Heartbeat {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Connection {
    /// Open a connection: derive a unique name from `tag`, write the
    /// first heartbeat, register in the global connections set and
    /// start the heartbeat task.
    pub async fn open(tag: &str, store: Arc<dyn Store>, config: RmqConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let name = name_with_token(tag);
        let heartbeat_key = keys::connection_heartbeat(&name);

        // Heartbeat first, registration second: a cleaner must never see
        // a registered connection without a liveness key.
        store
            .set_ex(
                &heartbeat_key,
                &Utc::now().timestamp().to_string(),
                config.heartbeat_ttl,
            )
            .await?;
        store.sadd(keys::CONNECTIONS_KEY, &name).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(heartbeat_loop(
            name.clone(),
            store.clone(),
            heartbeat_key,
            config.clone(),
            stop_rx,
        ));

        info!("connection {} opened", name);
        Ok(Arc::new(Self {
            name,
            store,
            config,
            queues: Mutex::new(HashMap::new()),
            heartbeat: Mutex::new(Some(Heartbeat { stop_tx, handle })),
        }))
    }

    /// The unique connection name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Open (or re-open) a queue on this connection. The queue is added
    /// to the global queues set; repeated opens return the same handle
    /// and do not reset consume state.
    pub async fn open_queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.store.sadd(keys::QUEUES_KEY, name).await?;

        let mut queues = self.queues.lock().await;
        let queue = queues.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Queue::new(name, &self.name, self.store.clone(), &self.config))
        });
        Ok(queue.clone())
    }

    /// Stop consumption on every queue opened by this connection and
    /// wait until all their workers have finished.
    pub async fn stop_all_consuming(&self) -> Result<()> {
        let queues: Vec<Arc<Queue>> = self.queues.lock().await.values().cloned().collect();
        for queue in queues {
            queue.stop_consuming().await?;
        }
        Ok(())
    }

    /// Orderly shutdown: stop all consuming, stop the heartbeat task,
    /// deregister and delete the heartbeat key. Anything still unacked
    /// afterwards is the cleaner's to reclaim.
    pub async fn close(&self) -> Result<()> {
        self.stop_all_consuming().await?;

        if let Some(heartbeat) = self.heartbeat.lock().await.take() {
            let _ = heartbeat.stop_tx.send(true);
            if let Err(e) = heartbeat.handle.await {
                error!("connection {} heartbeat task failed: {}", self.name, e);
            }
        }

        self.store.srem(keys::CONNECTIONS_KEY, &self.name).await?;
        self.store
            .del(&keys::connection_heartbeat(&self.name))
            .await?;

        info!("connection {} closed", self.name);
        Ok(())
    }
}

async fn heartbeat_loop(
    name: String,
    store: Arc<dyn Store>,
    heartbeat_key: String,
    config: RmqConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = tokio::time::sleep(config.heartbeat_interval) => {
                let stamp = Utc::now().timestamp().to_string();
                if let Err(e) = store.set_ex(&heartbeat_key, &stamp, config.heartbeat_ttl).await {
                    // Tolerated: the TTL provides slack, and a connection
                    // that stays unreachable past it counts as dead.
                    warn!("connection {} failed to send heartbeat: {}", name, e);
                }
            }
        }
    }
}
