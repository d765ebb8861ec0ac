//! Typed weather cache on top of a [`CacheStore`].

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use tracing::warn;

use crate::{
    error::StoreError,
    model::{CacheEntry, City},
    store::CacheStore,
};

const SEPARATOR: char = ':';

/// Derives store keys. City and quota keys live in separate namespaces so no
/// city name can collide with the quota counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
    by_date: bool,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>, by_date: bool) -> Self {
        Self { prefix: prefix.into(), by_date }
    }

    /// `<prefix>:city:<city>` or `<prefix>:city:<city>:<YYYY-MM-DD>`.
    pub fn weather(&self, city: &City, today: NaiveDate) -> String {
        let mut key = format!("{}{SEPARATOR}city{SEPARATOR}{}", self.prefix, city.normalized());
        if self.by_date {
            key.push(SEPARATOR);
            key.push_str(&today.format("%Y-%m-%d").to_string());
        }
        key
    }

    pub fn quota(&self) -> String {
        format!("{}{SEPARATOR}quota{SEPARATOR}external-api", self.prefix)
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new("weather", false)
    }
}

/// Reads and writes [`CacheEntry`] values as JSON.
#[derive(Debug, Clone)]
pub struct WeatherCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl WeatherCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// An undecodable value is reported as a miss; the next successful fetch
    /// overwrites it.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(%key, error = %err, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entry)?;
        self.store.set(key, raw, self.ttl).await
    }
}
