use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::CacheEntry;

/// How long fetched data counts as current. Also the cache TTL.
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(60 * 60);

/// `now - entry.timestamp < validity`. A timestamp ahead of `now` has age zero.
pub fn is_fresh(entry: &CacheEntry, now: DateTime<Utc>, validity: Duration) -> bool {
    match now.signed_duration_since(entry.timestamp).to_std() {
        Ok(age) => age < validity,
        Err(_) => true,
    }
}
