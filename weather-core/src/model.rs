use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Longest city name accepted from callers.
pub const MAX_CITY_LEN: usize = 100;

/// A validated city name: trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct City(String);

impl City {
    /// Validate a raw `city` query value.
    pub fn parse(raw: Option<&str>) -> Result<Self, ValidationError> {
        let trimmed = raw.map(str::trim).unwrap_or_default();

        if trimmed.is_empty() {
            return Err(ValidationError::MissingCity);
        }

        if trimmed.chars().count() > MAX_CITY_LEN {
            return Err(ValidationError::CityTooLong { max: MAX_CITY_LEN });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The name as the caller spelled it.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used for cache keys.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

impl std::fmt::Display for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Temperature as reported by a provider: either a number of degrees Celsius
/// or an already formatted string such as `"23°C"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Temperature {
    Celsius(f64),
    Formatted(String),
}

/// Weather for one hour of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub hour: u8,
    pub temperature: Temperature,
    pub condition: String,
}

/// What the cache holds for a city: the hourly records plus the instant they
/// were fetched from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<WeatherRecord>,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// Stamp freshly fetched data with the write time.
    pub fn new(data: Vec<WeatherRecord>, now: DateTime<Utc>) -> Self {
        Self { data, timestamp: now }
    }
}
