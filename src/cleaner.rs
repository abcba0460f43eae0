//! Cleaner: repatriation of dead connections' deliveries
//!
//! A connection whose heartbeat key has expired is dead. One sweep
//! moves every delivery such connections held in flight back to the
//! ready lists they came from and deletes the connections' metadata,
//! restoring the no-loss invariant after a crash.

use std::sync::Arc;

use tracing::info;

use crate::connection::Connection;
use crate::error::Result;
use crate::keys;
use crate::queue::return_unacked;
use crate::store::Store;

/// Janitor for crashed connections. Run [`clean`](Cleaner::clean) on a
/// periodic tick of the operator's choosing.
pub struct Cleaner {
    store: Arc<dyn Store>,
}

impl Cleaner {
    pub fn new(connection: &Connection) -> Self {
        Self {
            store: connection.store().clone(),
        }
    }

    /// One sweep over all known connections. Returns the total number
    /// of deliveries moved back to ready lists.
    pub async fn clean(&self) -> Result<u64> {
        let mut returned_total = 0u64;

        for connection in self.store.smembers(keys::CONNECTIONS_KEY).await? {
            let alive = self
                .store
                .exists(&keys::connection_heartbeat(&connection))
                .await?;
            if alive {
                continue;
            }
            returned_total += self.clean_connection(&connection).await?;
        }

        Ok(returned_total)
    }

    /// Repatriate one dead connection and remove its metadata
    async fn clean_connection(&self, connection: &str) -> Result<u64> {
        let queues_key = keys::connection_queues(connection);
        let mut returned = 0u64;

        for queue in self.store.smembers(&queues_key).await? {
            let unacked_key = keys::connection_queue_unacked(connection, &queue);
            returned += return_unacked(&self.store, &unacked_key, &keys::queue_ready(&queue)).await?;

            self.store
                .del(&keys::connection_queue_consumers(connection, &queue))
                .await?;
            self.store.del(&unacked_key).await?;
        }

        self.store.del(&queues_key).await?;
        self.store.srem(keys::CONNECTIONS_KEY, connection).await?;

        info!(
            "cleaned dead connection {}, returned {} deliveries",
            connection, returned
        );
        Ok(returned)
    }
}
