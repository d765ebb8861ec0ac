use std::time::Duration;

use thiserror::Error;

/// Malformed or missing caller input. Never touches cache or quota.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("City is required")]
    MissingCity,

    #[error("City name must be at most {max} characters")]
    CityTooLong { max: usize },
}

/// Failure of the backing key-value store.
///
/// These are the only errors the orchestrator lets escape: quota and provider
/// problems are always turned into an envelope.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("key '{key}' does not hold a counter")]
    WrongType { key: String },

    #[error("failed to encode cache entry")]
    Encode(#[from] serde_json::Error),
}

/// A provider response that does not have the shape of a day of hourly weather.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastShapeError {
    #[error("expected 24 hourly records, got {0}")]
    WrongLength(usize),

    #[error("record {index} has hour {hour}, expected {index}")]
    HourOutOfOrder { index: usize, hour: u8 },

    #[error("record for hour {hour} has an empty condition")]
    EmptyCondition { hour: u8 },

    #[error("record for hour {hour} has an invalid temperature")]
    InvalidTemperature { hour: u8 },
}

/// Why a single provider fetch did not produce cacheable data.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("provider request failed: {0:#}")]
    Provider(anyhow::Error),

    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),

    #[error("provider returned malformed data: {0}")]
    Malformed(#[from] ForecastShapeError),
}

impl FetchFailure {
    /// Coarse category safe to hand to clients. The `Display` text can carry
    /// upstream detail and belongs in logs only.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchFailure::Provider(_) => "provider error",
            FetchFailure::Timeout(_) => "timeout",
            FetchFailure::Malformed(_) => "malformed data",
        }
    }
}
