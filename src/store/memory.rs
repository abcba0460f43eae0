//! In-process store implementation
//!
//! Backs the full protocol with a mutex-guarded key space so tests and
//! downstream test suites can exercise publish, consumption and cleaning
//! without a server. Value keys expire lazily on read.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::error::StoreResult;
use crate::store::Store;

enum Entry {
    List(VecDeque<String>),
    Set(HashSet<String>),
    Value {
        #[allow(dead_code)]
        value: String,
        expires_at: Option<Instant>,
    },
}

/// Store implementation held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_move(&self, source: &str, destination: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();

        let value = match entries.get_mut(source) {
            Some(Entry::List(list)) => list.pop_back()?,
            _ => return None,
        };
        if matches!(entries.get(source), Some(Entry::List(list)) if list.is_empty()) {
            entries.remove(source);
        }

        match entries
            .entry(destination.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(list) => list.push_front(value.clone()),
            _ => {}
        }
        Some(value)
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        {
            let mut entries = self.entries.lock().unwrap();
            match entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::List(VecDeque::new()))
            {
                Entry::List(list) => list.push_front(value.to_string()),
                _ => {}
            }
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        let moved = self.try_move(source, destination);
        if moved.is_some() {
            self.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn brpoplpush(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(tokio::time::Instant::now() + timeout)
        };

        loop {
            // Register for wakeups before checking, so a push between the
            // check and the await cannot be missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_move(source, destination) {
                self.pushed.notify_waiters();
                return Ok(Some(value));
            }

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => return Ok(None),
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn lrem(&self, key: &str, count: isize, value: &str) -> StoreResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        let Some(Entry::List(list)) = entries.get_mut(key) else {
            return Ok(0);
        };

        let limit = if count <= 0 { usize::MAX } else { count as usize };
        let mut removed = 0i64;
        while (removed as usize) < limit {
            match list.iter().position(|v| v == value) {
                Some(idx) => {
                    list.remove(idx);
                    removed += 1;
                }
                None => break,
            }
        }
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn llen(&self, key: &str) -> StoreResult<i64> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(Entry::List(list)) => Ok(list.len() as i64),
            _ => Ok(0),
        }
    }

    async fn del(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        Ok(if entries.remove(key).is_some() { 1 } else { 0 })
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()))
        {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            _ => Ok(false),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let Some(Entry::Set(set)) = entries.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry::Value {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let expired = matches!(
            entries.get(key),
            Some(Entry::Value { expires_at: Some(expires_at), .. }) if *expires_at <= Instant::now()
        );
        if expired {
            entries.remove(key);
            return Ok(false);
        }
        Ok(entries.contains_key(key))
    }
}
