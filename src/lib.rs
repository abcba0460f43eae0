//! rmq - Redis-backed at-least-once message queue
//!
//! Producers publish opaque string payloads to named queues; consumers
//! register on a connection and receive deliveries through an in-process
//! channel, acknowledging or rejecting each one. No successfully
//! published delivery is lost, even if a consumer process crashes
//! mid-processing.
//!
//! # How a payload moves
//!
//! ```text
//! publish ──> ready list ──(blocking pop-push)──> unacked list
//!                 ^                                    │
//!                 │                             delivery channel
//!                 │                                    │
//!                 │                              consumer worker
//!                 │                                    │
//!                 ├──────────── reject/push ───────────┤
//!                 ├──────── crash + cleaner sweep ─────┤
//!                 │                                   ack
//!                 │                                    │
//!                 └> redelivered                    (gone)
//! ```
//!
//! Every connection refreshes a heartbeat key with a short TTL. When a
//! process dies, the key expires and the next [`Cleaner`] sweep moves
//! everything the connection held in flight back to the ready lists it
//! came from. A crash between fetch and ack is redelivered; that is the
//! at-least-once contract.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rmq::{Connection, Consumer, Delivery, RedisStore, RmqConfig};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl Consumer for Printer {
//!     async fn consume(&self, delivery: Delivery) {
//!         println!("got {}", delivery.payload());
//!         let _ = delivery.ack().await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rmq::Result<()> {
//!     let store = Arc::new(RedisStore::connect("redis://127.0.0.1:6379").await?);
//!     let connection = Connection::open("host", store, RmqConfig::default()).await?;
//!
//!     let things = connection.open_queue("things").await?;
//!     things.publish("delivery 1").await?;
//!
//!     things.prepare_consumption(16).await?;
//!     things.add_consumer("printer", Arc::new(Printer)).await?;
//!
//!     // ... run until shutdown ...
//!     connection.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cleaner;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod keys;
pub mod queue;
pub mod stats;
pub mod store;

pub use cleaner::Cleaner;
pub use config::RmqConfig;
pub use connection::Connection;
pub use delivery::{Consumer, Delivery};
pub use error::{Result, RmqError, StoreError, StoreResult};
pub use queue::Queue;
pub use stats::{ConnectionStat, QueueStat, Stats};
pub use store::{MemoryStore, RedisStore, Store};
