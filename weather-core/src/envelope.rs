//! Uniform wire shape for every weather response, success or error.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::{CacheEntry, City, WeatherRecord};

/// Where the data in a successful response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Cache,
    Api,
    StaleCache,
}

impl Source {
    pub fn is_stale(self) -> bool {
        matches!(self, Source::StaleCache)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub source: Source,
    pub stale: bool,
    /// When the data was obtained from the provider.
    pub fetched_at: DateTime<Utc>,
    /// When this response was built.
    pub served_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherPayload {
    pub city: String,
    pub date: NaiveDate,
    pub weather: Vec<WeatherRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    QuotaExceeded,
    ProviderUnavailable,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind is surfaced with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::QuotaExceeded => 429,
            ErrorKind::ProviderUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Exactly one of `data` and `error` is set; the constructors are the only
/// way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<WeatherPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
}

impl ResponseEnvelope {
    /// Wrap cached or freshly fetched records. The entry is only read.
    pub fn from_entry(city: &City, entry: &CacheEntry, source: Source, now: DateTime<Utc>) -> Self {
        let payload = WeatherPayload {
            city: city.as_str().to_string(),
            date: entry.timestamp.date_naive(),
            weather: entry.data.clone(),
        };
        let meta = Meta {
            source,
            stale: source.is_stale(),
            fetched_at: entry.timestamp,
            served_at: now,
        };
        Self::success(payload, meta)
    }

    pub fn success(data: WeatherPayload, meta: Meta) -> Self {
        Self { success: true, data: Some(data), error: None, meta: Some(meta) }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody { kind, message: message.into(), details }),
            meta: None,
        }
    }

    pub fn quota_exceeded() -> Self {
        Self::failure(ErrorKind::QuotaExceeded, "Rate limit exceeded. Please try again later.", None)
    }

    pub fn provider_unavailable(failure: &crate::error::FetchFailure) -> Self {
        Self::failure(
            ErrorKind::ProviderUnavailable,
            "Weather provider unavailable and no cached data",
            Some(serde_json::Value::String(failure.reason().to_string())),
        )
    }

    pub fn validation(err: &crate::error::ValidationError) -> Self {
        Self::failure(ErrorKind::Validation, err.to_string(), None)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::failure(ErrorKind::Internal, message, None)
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&WeatherPayload> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        self.error.as_ref()
    }

    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    pub fn status_code(&self) -> u16 {
        self.error.as_ref().map_or(200, |err| err.kind.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{FetchFailure, ValidationError},
        model::Temperature,
    };
    use std::time::Duration;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry() -> CacheEntry {
        CacheEntry::new(
            vec![WeatherRecord {
                hour: 0,
                temperature: Temperature::Formatted("18°C".into()),
                condition: "Sunny".into(),
            }],
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn stale_success_serializes_wire_shape() {
        let city = City::parse(Some("Berlin")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();

        let envelope = ResponseEnvelope::from_entry(&city, &entry(), Source::StaleCache, now);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "success": true,
                "data": {
                    "city": "Berlin",
                    "date": "2024-06-01",
                    "weather": [{ "hour": 0, "temperature": "18°C", "condition": "Sunny" }]
                },
                "meta": {
                    "source": "stale-cache",
                    "stale": true,
                    "fetchedAt": "2024-06-01T08:00:00Z",
                    "servedAt": "2024-06-01T10:00:00Z"
                }
            })
        );
        assert_eq!(envelope.status_code(), 200);
    }

    #[test]
    fn fresh_sources_are_not_stale() {
        let city = City::parse(Some("Paris")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 10, 0).unwrap();

        for source in [Source::Cache, Source::Api] {
            let envelope = ResponseEnvelope::from_entry(&city, &entry(), source, now);
            assert!(!envelope.meta().unwrap().stale);
        }
    }

    #[test]
    fn failure_has_error_and_no_data() {
        let envelope = ResponseEnvelope::quota_exceeded();
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["success"], json!(false));
        assert!(value.get("data").is_none());
        assert!(value["error"]["message"].as_str().unwrap().contains("Rate limit exceeded"));
        assert_eq!(envelope.status_code(), 429);
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(ResponseEnvelope::validation(&ValidationError::MissingCity).status_code(), 400);
        assert_eq!(ResponseEnvelope::provider_unavailable(&FetchFailure::Timeout(Duration::from_secs(5))).status_code(), 503);
        assert_eq!(ResponseEnvelope::internal("store down").status_code(), 500);
    }

    #[test]
    fn provider_failure_carries_details() {
        let envelope = ResponseEnvelope::provider_unavailable(&FetchFailure::Timeout(Duration::from_secs(5)));
        let error = envelope.error().unwrap();

        assert_eq!(error.kind, ErrorKind::ProviderUnavailable);
        assert_eq!(error.details, Some(json!("timeout")));
        assert!(envelope.data().is_none());
    }

    #[test]
    fn provider_failure_details_hide_upstream_text() {
        let failure = FetchFailure::Provider(anyhow::anyhow!("GET http://upstream/?key=hunter2 refused"));
        let value = serde_json::to_value(ResponseEnvelope::provider_unavailable(&failure)).unwrap();

        assert_eq!(value["error"]["details"], json!("provider error"));
        assert!(!value.to_string().contains("hunter2"));
    }
}
