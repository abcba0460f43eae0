//! Queue statistics for dashboards and operational tooling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys;
use crate::store::Store;

/// One connection's footprint on a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStat {
    /// Connection name
    pub connection: String,
    /// Whether its heartbeat key currently exists
    pub alive: bool,
    /// Deliveries it holds in flight on this queue
    pub unacked_count: i64,
    /// Consumer names registered on this (connection, queue)
    pub consumers: Vec<String>,
}

/// Snapshot of one queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStat {
    /// Queue name
    pub queue: String,
    /// Payloads waiting in the ready list
    pub ready_count: i64,
    /// Connections with in-flight deliveries or registered consumers
    pub connections: Vec<ConnectionStat>,
}

/// Snapshot of every known queue and connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// When the snapshot was taken
    pub collected_at: DateTime<Utc>,
    /// Per-queue statistics, sorted by queue name
    pub queues: Vec<QueueStat>,
}

impl Stats {
    /// Walk the global queues and connections sets and read list
    /// lengths, consumer sets and liveness for each pair.
    pub async fn collect(store: &dyn Store) -> Result<Stats> {
        let mut connections = store.smembers(keys::CONNECTIONS_KEY).await?;
        connections.sort();

        let mut liveness = Vec::with_capacity(connections.len());
        for connection in &connections {
            liveness.push(
                store
                    .exists(&keys::connection_heartbeat(connection))
                    .await?,
            );
        }

        let mut queue_names = store.smembers(keys::QUEUES_KEY).await?;
        queue_names.sort();

        let mut queues = Vec::with_capacity(queue_names.len());
        for queue in queue_names {
            let ready_count = store.llen(&keys::queue_ready(&queue)).await?;

            let mut per_connection = Vec::new();
            for (connection, alive) in connections.iter().zip(&liveness) {
                let unacked_count = store
                    .llen(&keys::connection_queue_unacked(connection, &queue))
                    .await?;
                let mut consumers = store
                    .smembers(&keys::connection_queue_consumers(connection, &queue))
                    .await?;
                consumers.sort();

                if unacked_count == 0 && consumers.is_empty() {
                    continue;
                }
                per_connection.push(ConnectionStat {
                    connection: connection.clone(),
                    alive: *alive,
                    unacked_count,
                    consumers,
                });
            }

            queues.push(QueueStat {
                queue,
                ready_count,
                connections: per_connection,
            });
        }

        Ok(Stats {
            collected_at: Utc::now(),
            queues,
        })
    }
}
