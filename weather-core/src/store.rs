//! Key-value store contract consumed by the cache and the quota gate, plus an
//! in-process implementation.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    error::StoreError,
};

/// TTL-aware key-value store with an atomic counter primitive.
///
/// Values are opaque strings, so a shared store (Redis and friends) can sit
/// behind this trait as easily as the in-memory one.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Fetch a live value. A miss is `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite `key` unconditionally; the value disappears after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically add one to the counter at `key` and return the new value.
    ///
    /// The TTL is armed only when the returned value is 1. Re-arming it on
    /// every call would keep pushing the expiry back and the counter would
    /// never reset.
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    /// `None` means the slot never expires.
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}

/// Writes between two full sweeps of expired slots.
const SWEEP_EVERY: u64 = 64;

/// Process-local store. Expired slots are dropped when read, and every
/// `SWEEP_EVERY` writes a sweep drops the ones nobody reads again.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    slots: Arc<DashMap<String, Slot>>,
    writes: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { slots: Arc::new(DashMap::new()), writes: Arc::new(AtomicU64::new(0)), clock }
    }

    /// Drop every expired slot and return how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!(removed, held = self.slots.len(), "purged expired slots");
        }
        removed
    }

    fn note_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }
    }

    /// When `key` is due to expire, if it is live and has a TTL.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.slots
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .and_then(|slot| slot.expires_at)
    }

    /// Number of slots held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();

        {
            let Some(slot) = self.slots.get(key) else {
                return Ok(None);
            };

            if !slot.is_expired(now) {
                let value = match &slot.value {
                    Value::Text(text) => text.clone(),
                    Value::Counter(count) => count.to_string(),
                };
                return Ok(Some(value));
            }
        }

        // The read guard is gone; removing under it would deadlock the shard.
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.slots.insert(
            key.to_string(),
            Slot { value: Value::Text(value), expires_at: expiry(now, ttl) },
        );
        self.note_write();
        Ok(())
    }

    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();

        // The entry guard holds the shard write lock for the whole
        // read-modify-write, so concurrent callers see distinct values.
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot { value: Value::Counter(0), expires_at: None });

        if slot.is_expired(now) {
            *slot = Slot { value: Value::Counter(0), expires_at: None };
        }

        let count = match &mut slot.value {
            Value::Counter(count) => {
                *count = count.saturating_add(1);
                *count
            }
            Value::Text(_) => return Err(StoreError::WrongType { key: key.to_string() }),
        };

        if count == 1 {
            slot.expires_at = expiry(now, ttl);
        }

        Ok(count)
    }
}
