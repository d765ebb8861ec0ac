//! Per-request decision: serve from cache, spend quota on a fresh fetch, or
//! fall back to whatever stale entry exists.
//!
//! ```text
//! CHECK_CACHE --fresh--> respond(cache)
//!      |
//!      v
//! CHECK_QUOTA --rejected--> FALLBACK_OR_REJECT
//!      |
//!      v
//!    FETCH --ok--> store, respond(api)
//!      |
//!      +--failed / timed out / malformed--> FALLBACK_OR_REJECT
//! ```
//!
//! A request makes at most one provider call. A fresh hit never touches the
//! quota.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    Config,
    cache::{CacheKeys, WeatherCache},
    clock::{Clock, SystemClock},
    envelope::{ResponseEnvelope, Source},
    error::{FetchFailure, StoreError},
    freshness::is_fresh,
    model::{CacheEntry, City, WeatherRecord},
    provider::WeatherProvider,
    quota::QuotaGate,
    store::CacheStore,
    validate::validate_forecast,
};

/// Why a lookup ended without fresh data.
#[derive(Debug)]
enum Degraded {
    QuotaExceeded,
    FetchFailed(FetchFailure),
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    cache: WeatherCache,
    keys: CacheKeys,
    quota: QuotaGate,
    provider: Arc<dyn WeatherProvider>,
    clock: Arc<dyn Clock>,
    validity: Duration,
    fetch_timeout: Duration,
}

impl Orchestrator {
    pub fn builder(store: Arc<dyn CacheStore>, provider: Arc<dyn WeatherProvider>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(store, provider)
    }

    /// Wire an orchestrator from the service config.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CacheStore>,
        provider: Arc<dyn WeatherProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::builder(store, provider)
            .clock(clock)
            .keys(CacheKeys::new(config.cache.key_prefix.clone(), config.cache.key_by_date))
            .validity(config.cache.validity())
            .stale_grace(config.cache.stale_grace())
            .quota(config.quota.limit, config.quota.window())
            .fetch_timeout(config.fetch.timeout())
            .build()
    }

    /// Resolve one lookup for an already validated city.
    ///
    /// Only store failures escape as errors; quota and provider problems end
    /// in a stale success or an error envelope.
    pub async fn lookup(&self, city: &City) -> Result<ResponseEnvelope, StoreError> {
        let key = self.keys.weather(city, self.clock.now().date_naive());

        let cached = self.cache.get(&key).await?;
        if let Some(entry) = &cached {
            if is_fresh(entry, self.clock.now(), self.validity) {
                debug!(%city, %key, "serving fresh cache entry");
                return Ok(ResponseEnvelope::from_entry(city, entry, Source::Cache, self.clock.now()));
            }
        }

        let decision = self.quota.check_and_consume().await?;
        if !decision.admitted {
            warn!(%city, count = decision.count, limit = decision.limit, "provider quota exhausted");
            return Ok(self.fallback_or_reject(city, cached.as_ref(), Degraded::QuotaExceeded));
        }

        match self.fetch(city).await {
            Ok(data) => {
                let entry = CacheEntry::new(data, self.clock.now());
                self.cache.set(&key, &entry).await?;
                info!(%city, %key, provider = %self.provider.id(), "cached fresh forecast");
                Ok(ResponseEnvelope::from_entry(city, &entry, Source::Api, self.clock.now()))
            }
            Err(failure) => {
                warn!(%city, reason = failure.reason(), error = %failure, "provider fetch failed");
                Ok(self.fallback_or_reject(city, cached.as_ref(), Degraded::FetchFailed(failure)))
            }
        }
    }

    async fn fetch(&self, city: &City) -> Result<Vec<WeatherRecord>, FetchFailure> {
        let data = tokio::time::timeout(self.fetch_timeout, self.provider.fetch(city))
            .await
            .map_err(|_| FetchFailure::Timeout(self.fetch_timeout))?
            .map_err(FetchFailure::Provider)?;

        validate_forecast(&data)?;
        Ok(data)
    }

    fn fallback_or_reject(&self, city: &City, cached: Option<&CacheEntry>, reason: Degraded) -> ResponseEnvelope {
        if let Some(entry) = cached {
            debug!(%city, fetched_at = %entry.timestamp, "serving stale cache entry");
            return ResponseEnvelope::from_entry(city, entry, Source::StaleCache, self.clock.now());
        }

        match reason {
            Degraded::QuotaExceeded => ResponseEnvelope::quota_exceeded(),
            Degraded::FetchFailed(failure) => ResponseEnvelope::provider_unavailable(&failure),
        }
    }
}

pub struct OrchestratorBuilder {
    store: Arc<dyn CacheStore>,
    provider: Arc<dyn WeatherProvider>,
    clock: Arc<dyn Clock>,
    keys: CacheKeys,
    validity: Duration,
    stale_grace: Duration,
    quota_limit: u64,
    quota_window: Duration,
    fetch_timeout: Duration,
}

impl OrchestratorBuilder {
    fn new(store: Arc<dyn CacheStore>, provider: Arc<dyn WeatherProvider>) -> Self {
        let defaults = Config::default();
        Self {
            store,
            provider,
            clock: Arc::new(SystemClock),
            keys: CacheKeys::default(),
            validity: defaults.cache.validity(),
            stale_grace: defaults.cache.stale_grace(),
            quota_limit: defaults.quota.limit,
            quota_window: defaults.quota.window(),
            fetch_timeout: defaults.fetch.timeout(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn keys(mut self, keys: CacheKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Freshness window, and the cache TTL when there is no stale grace.
    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Keep entries this long past `validity` so they can back a fallback.
    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    pub fn quota(mut self, limit: u64, window: Duration) -> Self {
        self.quota_limit = limit;
        self.quota_window = window;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn build(self) -> Orchestrator {
        let quota = QuotaGate::new(
            Arc::clone(&self.store),
            self.keys.quota(),
            self.quota_limit,
            self.quota_window,
        );

        Orchestrator {
            cache: WeatherCache::new(self.store, self.validity.saturating_add(self.stale_grace)),
            keys: self.keys,
            quota,
            provider: self.provider,
            clock: self.clock,
            validity: self.validity,
            fetch_timeout: self.fetch_timeout,
        }
    }
}
