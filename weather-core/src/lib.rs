//! Core library for the `weather-server` service.
//!
//! This crate defines:
//! - The lookup orchestrator: cache first, then a shared provider quota, then
//!   a bounded provider fetch, with stale-cache fallback
//! - The key-value store contract and an in-memory implementation
//! - Abstraction over weather providers
//! - The response envelope and configuration handling
//!
//! It is used by `weather-server`, but the orchestrator can sit behind any
//! transport.

pub mod cache;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod freshness;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod quota;
pub mod store;
pub mod validate;

pub use cache::{CacheKeys, WeatherCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ProviderConfig};
pub use envelope::{ErrorKind, ResponseEnvelope, Source};
pub use error::{FetchFailure, ForecastShapeError, StoreError, ValidationError};
pub use model::{CacheEntry, City, Temperature, WeatherRecord};
pub use orchestrator::Orchestrator;
pub use provider::{ProviderId, WeatherProvider};
pub use quota::{QuotaDecision, QuotaGate};
pub use store::{CacheStore, InMemoryStore};
