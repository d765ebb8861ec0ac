//! Shape checks for provider output. A forecast that fails here is treated
//! exactly like a failed fetch and is never cached.

use crate::{
    error::ForecastShapeError,
    model::{Temperature, WeatherRecord},
};

pub const HOURS_PER_DAY: usize = 24;

pub fn validate_forecast(records: &[WeatherRecord]) -> Result<(), ForecastShapeError> {
    if records.len() != HOURS_PER_DAY {
        return Err(ForecastShapeError::WrongLength(records.len()));
    }

    for (index, record) in records.iter().enumerate() {
        let hour = record.hour;

        if usize::from(hour) != index {
            return Err(ForecastShapeError::HourOutOfOrder { index, hour });
        }

        if record.condition.trim().is_empty() {
            return Err(ForecastShapeError::EmptyCondition { hour });
        }

        let valid_temperature = match &record.temperature {
            Temperature::Celsius(degrees) => degrees.is_finite(),
            Temperature::Formatted(text) => !text.trim().is_empty(),
        };
        if !valid_temperature {
            return Err(ForecastShapeError::InvalidTemperature { hour });
        }
    }

    Ok(())
}
