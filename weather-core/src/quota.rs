//! Shared budget of external provider calls.
//!
//! The budget is a fixed window that opens on first use and closes when the
//! counter's TTL lapses, after which the next call opens a new one.
//! Consumption happens before the provider is called, so an admitted call
//! that then fails still spends a unit.

use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{error::StoreError, store::CacheStore};

pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub admitted: bool,
    /// Counter value after this consumption.
    pub count: u64,
    pub limit: u64,
}

impl QuotaDecision {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

#[derive(Debug, Clone)]
pub struct QuotaGate {
    store: Arc<dyn CacheStore>,
    key: String,
    limit: u64,
    window: Duration,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn CacheStore>, key: impl Into<String>, limit: u64, window: Duration) -> Self {
        Self { store, key: key.into(), limit, window }
    }

    /// Spend one unit and report whether the call may go ahead.
    pub async fn check_and_consume(&self) -> Result<QuotaDecision, StoreError> {
        let count = self.store.increment_with_expiry(&self.key, self.window).await?;
        let decision = QuotaDecision { admitted: count <= self.limit, count, limit: self.limit };

        debug!(
            key = %self.key,
            count,
            limit = self.limit,
            admitted = decision.admitted,
            "quota consumed"
        );

        Ok(decision)
    }
}
