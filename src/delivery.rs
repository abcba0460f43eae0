//! In-flight deliveries and the consumer contract

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, RmqError};
use crate::store::Store;

/// Handler registered against a consuming queue.
///
/// `consume` must settle every delivery exactly once, by calling
/// [`Delivery::ack`], [`Delivery::reject`] or [`Delivery::push`]. A
/// delivery that is never settled stays in the unacked list until the
/// queue stops consuming or a cleaner sweep reclaims it.
#[async_trait::async_trait]
pub trait Consumer: Send + Sync + 'static {
    async fn consume(&self, delivery: Delivery);
}

/// One in-flight payload.
///
/// A delivery does not hold its queue; it carries the unacked and ready
/// keys plus a store handle, which is all it needs to remove itself on
/// ack or re-enqueue itself on reject.
pub struct Delivery {
    payload: String,
    unacked_key: String,
    ready_key: String,
    store: Arc<dyn Store>,
    settled: AtomicBool,
}

impl Delivery {
    pub(crate) fn new(
        payload: String,
        unacked_key: String,
        ready_key: String,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            payload,
            unacked_key,
            ready_key,
            store,
            settled: AtomicBool::new(false),
        }
    }

    /// The delivered payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Acknowledge successful processing: removes this payload from the
    /// unacked list. A second settle attempt fails with `AlreadySettled`
    /// without touching the store.
    pub async fn ack(&self) -> Result<()> {
        self.settle()?;
        self.store.lrem(&self.unacked_key, 1, &self.payload).await?;
        Ok(())
    }

    /// Reject the delivery: removes it from the unacked list and pushes
    /// it back to the queue's ready list for redelivery. The two steps
    /// are not atomic; transient visibility in both lists is permitted
    /// by the at-least-once contract.
    pub async fn reject(&self) -> Result<()> {
        self.settle()?;
        self.requeue().await
    }

    /// Reject semantics for handlers that want a retry without treating
    /// the delivery as failed
    pub async fn push(&self) -> Result<()> {
        self.settle()?;
        self.requeue().await
    }

    fn settle(&self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(RmqError::AlreadySettled);
        }
        Ok(())
    }

    async fn requeue(&self) -> Result<()> {
        self.store.lrem(&self.unacked_key, 1, &self.payload).await?;
        self.store.lpush(&self.ready_key, &self.payload).await?;
        Ok(())
    }
}
