use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::model::{City, Temperature, WeatherRecord};

use super::{ProviderId, WeatherProvider};

const FORECAST_URL: &str = "http://api.weatherapi.com/v1/forecast.json";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, FORECAST_URL)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self { api_key, http: Client::new(), base_url: base_url.into() }
    }

    async fn fetch_today(&self, city: &City) -> Result<Vec<WeatherRecord>> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", city.as_str()),
                ("days", "1"),
                ("aqi", "no"),
                ("alerts", "no"),
            ])
            .send()
            .await
            // reqwest errors print the request URL, which carries the API key.
            .map_err(reqwest::Error::without_url)
            .context("Failed to send request to WeatherAPI.com (forecast)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to read WeatherAPI forecast response body")?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "WeatherAPI forecast request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let records = parse_forecast(&body)?;
        debug!(city = %city, hours = records.len(), "weatherapi forecast received");
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaForecastHour {
    /// Local time, e.g. `2024-06-01 13:00`.
    time: String,
    temp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    hour: Vec<WaForecastHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
}

/// Map the first forecast day into hourly records. Shape checks are left to
/// the caller; this only fails when the body cannot be read at all.
fn parse_forecast(body: &str) -> Result<Vec<WeatherRecord>> {
    let parsed: WaForecastResponse =
        serde_json::from_str(body).context("Failed to parse WeatherAPI forecast JSON")?;

    let day = parsed
        .forecast
        .forecastday
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("WeatherAPI response contained no forecastday data"))?;

    day.hour
        .into_iter()
        .map(|entry| -> Result<WeatherRecord> {
            let local = NaiveDateTime::parse_from_str(&entry.time, "%Y-%m-%d %H:%M")
                .with_context(|| format!("Unexpected WeatherAPI hour timestamp '{}'", entry.time))?;

            Ok(WeatherRecord {
                hour: local.hour() as u8,
                temperature: Temperature::Celsius(entry.temp_c),
                condition: entry.condition.text,
            })
        })
        .collect()
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    async fn fetch(&self, city: &City) -> Result<Vec<WeatherRecord>> {
        self.fetch_today(city).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    const KEY: &str = "sk-weather-0123456789";

    /// Answer one request with `status` and `body`, return the base URL.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{addr}/v1/forecast.json")
    }

    fn london() -> City {
        City::parse(Some("London")).unwrap()
    }

    fn forecast_body(hours: usize) -> String {
        let hour: Vec<_> = (0..hours)
            .map(|h| {
                json!({
                    "time": format!("2024-06-01 {h:02}:00"),
                    "temp_c": 10.0 + h as f64 / 2.0,
                    "condition": { "text": "Partly cloudy" },
                    "humidity": 70
                })
            })
            .collect();

        json!({
            "location": { "name": "London", "country": "United Kingdom" },
            "forecast": { "forecastday": [{ "date": "2024-06-01", "hour": hour }] }
        })
        .to_string()
    }

    #[test]
    fn parses_hourly_forecast() {
        let records = parse_forecast(&forecast_body(24)).unwrap();

        assert_eq!(records.len(), 24);
        assert_eq!(records[0].hour, 0);
        assert_eq!(records[23].hour, 23);
        assert_eq!(records[2].temperature, Temperature::Celsius(11.0));
        assert_eq!(records[5].condition, "Partly cloudy");
    }

    #[test]
    fn missing_forecast_day_is_an_error() {
        let body = json!({ "forecast": { "forecastday": [] } }).to_string();
        let err = parse_forecast(&body).unwrap_err();
        assert!(err.to_string().contains("no forecastday"));
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(parse_forecast("<html>").is_err());
    }

    #[tokio::test]
    async fn fetch_maps_successful_response() {
        let url = serve_once("200 OK", forecast_body(24)).await;
        let provider = WeatherApiProvider::with_base_url(KEY.to_string(), url);

        let records = provider.fetch(&london()).await.unwrap();
        assert_eq!(records.len(), 24);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let body = json!({ "error": { "code": 9999, "message": "Internal application error." } });
        let url = serve_once("500 Internal Server Error", body.to_string()).await;
        let provider = WeatherApiProvider::with_base_url(KEY.to_string(), url);

        let err = provider.fetch(&london()).await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("status 500"), "{msg}");
        assert!(msg.contains("Internal application error"), "{msg}");
        assert!(!msg.contains(KEY), "{msg}");
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_api_key() {
        let provider =
            WeatherApiProvider::with_base_url(KEY.to_string(), "http://127.0.0.1:1/v1/forecast.json");

        let err = provider.fetch(&london()).await.unwrap_err();
        let msg = format!("{err:#} {err:?}");
        assert!(msg.contains("Failed to send request"), "{msg}");
        assert!(!msg.contains(KEY), "{msg}");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(300);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
    }
}
