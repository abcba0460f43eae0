//! Backing-store seam
//!
//! The protocol only needs a handful of atomic list/set/key primitives;
//! `Store` names them and two implementations provide them: `RedisStore`
//! for production and `MemoryStore` for hermetic tests.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::time::Duration;

use crate::error::StoreResult;

/// Minimal primitives the queue protocol depends on.
///
/// Implementations must make each call atomic per key; the protocol's
/// correctness is rooted in that atomicity and never substitutes
/// client-side read-modify-write sequences for it.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Push a value to the left end of a list
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Atomically pop the rightmost element of `source` and push it to
    /// the left end of `destination`; `None` if `source` is empty
    async fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>>;

    /// Blocking variant of [`rpoplpush`](Store::rpoplpush); waits up to
    /// `timeout` for an element to appear (`Duration::ZERO` waits
    /// indefinitely) and returns `None` on timeout
    async fn brpoplpush(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>>;

    /// Remove up to `count` occurrences of `value` from a list, scanning
    /// from the left; returns the number removed
    async fn lrem(&self, key: &str, count: isize, value: &str) -> StoreResult<i64>;

    /// Length of a list (0 for a missing key)
    async fn llen(&self, key: &str) -> StoreResult<i64>;

    /// Delete a key; returns the number of keys removed
    async fn del(&self, key: &str) -> StoreResult<i64>;

    /// Add a member to a set; `true` if it was not already present
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Remove a member from a set; `true` if it was present
    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// All members of a set (empty for a missing key)
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Set a plain key to `value` with a time-to-live
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Whether a key currently exists (expired keys do not)
    async fn exists(&self, key: &str) -> StoreResult<bool>;
}
