use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rand::Rng;

use crate::{
    model::{City, Temperature, WeatherRecord},
    provider::{ProviderId, WeatherProvider},
    validate::HOURS_PER_DAY,
};

const CONDITIONS: &[&str] = &["Clear", "Cloudy", "Rain", "Sunny", "Storm", "Snow", "Fog"];

pub const DEFAULT_FAILURE_RATE: f64 = 0.2;

/// Offline provider producing a random but plausible day, failing now and then
/// like a flaky upstream would.
#[derive(Debug, Clone)]
pub struct MockProvider {
    failure_rate: f64,
}

impl MockProvider {
    /// `failure_rate` is clamped to `[0, 1]`.
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) };
        Self { failure_rate }
    }

    pub fn reliable() -> Self {
        Self::new(0.0)
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    fn generate(&self) -> Result<Vec<WeatherRecord>> {
        let mut rng = rand::rng();

        if rng.random_bool(self.failure_rate) {
            return Err(anyhow!("Mock weather API failure"));
        }

        let base: i32 = rng.random_range(10..=30);
        let records = (0..HOURS_PER_DAY as u8)
            .map(|hour| {
                let degrees = base + rng.random_range(-5..=5);
                let condition = CONDITIONS[rng.random_range(0..CONDITIONS.len())];
                WeatherRecord {
                    hour,
                    temperature: Temperature::Formatted(format!("{degrees}°C")),
                    condition: condition.to_string(),
                }
            })
            .collect();

        Ok(records)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_RATE)
    }
}

#[async_trait]
impl WeatherProvider for MockProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Mock
    }

    async fn fetch(&self, _city: &City) -> Result<Vec<WeatherRecord>> {
        self.generate()
    }
}
