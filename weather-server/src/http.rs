//! HTTP surface: `GET /weather?city=<name>` plus liveness routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use weather_core::{City, Orchestrator, ResponseEnvelope, envelope::ErrorKind};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator: Arc::new(orchestrator) }
    }
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    city: Option<String>,
}

/// Envelope rendered with the status its content calls for.
pub struct EnvelopeResponse(pub ResponseEnvelope);

impl IntoResponse for EnvelopeResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/weather", get(get_weather))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "Weather service is running"
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn get_weather(
    State(state): State<AppState>,
    query: Result<Query<WeatherQuery>, QueryRejection>,
) -> EnvelopeResponse {
    let raw = match query {
        Ok(Query(query)) => query.city,
        Err(rejection) => {
            debug!(error = %rejection, "rejected weather query");
            return EnvelopeResponse(ResponseEnvelope::failure(
                ErrorKind::Validation,
                "Invalid request query",
                Some(json!(rejection.body_text())),
            ));
        }
    };

    let city = match City::parse(raw.as_deref()) {
        Ok(city) => city,
        Err(err) => return EnvelopeResponse(ResponseEnvelope::validation(&err)),
    };

    match state.orchestrator.lookup(&city).await {
        Ok(envelope) => EnvelopeResponse(envelope),
        Err(err) => {
            error!(%city, error = %err, "weather lookup failed");
            EnvelopeResponse(ResponseEnvelope::internal("Internal server error"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`
    use weather_core::{
        CacheKeys, CacheStore, InMemoryStore, ManualClock, provider::mock::MockProvider,
    };

    const HOUR: Duration = Duration::from_secs(3600);

    fn app(store: Arc<InMemoryStore>, provider: MockProvider, clock: ManualClock) -> Router {
        let orchestrator = Orchestrator::builder(store, Arc::new(provider))
            .clock(Arc::new(clock))
            .stale_grace(HOUR)
            .build();
        router(AppState::new(orchestrator))
    }

    fn fixture() -> (Arc<InMemoryStore>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        (store, clock)
    }

    async fn get(app: Router, uri: &str) -> Result<(StatusCode, Value), String> {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let body = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        Ok((status, body))
    }

    async fn exhaust_quota(store: &InMemoryStore) {
        let key = CacheKeys::default().quota();
        for _ in 0..100 {
            store.increment_with_expiry(&key, HOUR).await.unwrap();
        }
    }

    #[tokio::test]
    async fn fetches_from_api_then_serves_from_cache() -> Result<(), String> {
        let (store, clock) = fixture();
        let app = app(store.clone(), MockProvider::reliable(), clock);

        let (status, body) = get(app.clone(), "/weather?city=London").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["city"], "London");
        assert_eq!(body["data"]["weather"].as_array().map(Vec::len), Some(24));
        assert_eq!(body["meta"]["source"], "api");
        assert_eq!(body["meta"]["stale"], false);
        assert!(store.get("weather:city:london").await.unwrap().is_some());

        let (status, body) = get(app, "/weather?city=london").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["source"], "cache");
        assert_eq!(body["meta"]["stale"], false);
        Ok(())
    }

    #[tokio::test]
    async fn missing_or_blank_city_is_400() -> Result<(), String> {
        let (store, clock) = fixture();
        let app = app(store.clone(), MockProvider::reliable(), clock);

        for uri in ["/weather", "/weather?city=", "/weather?city=%20%20"] {
            let (status, body) = get(app.clone(), uri).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["success"], false);
            assert_eq!(body["error"]["message"], "City is required");
        }

        assert!(store.is_empty(), "validation failures touch neither cache nor quota");
        Ok(())
    }

    #[tokio::test]
    async fn quota_exhausted_without_cache_is_429() -> Result<(), String> {
        let (store, clock) = fixture();
        exhaust_quota(&store).await;
        let app = app(store, MockProvider::reliable(), clock);

        let (status, body) = get(app, "/weather?city=Berlin").await?;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"]["message"].as_str().unwrap_or_default().contains("Rate limit exceeded"));
        assert!(body.get("data").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn quota_exhausted_with_old_entry_serves_stale() -> Result<(), String> {
        let (store, clock) = fixture();
        let (status, _) =
            get(app(store.clone(), MockProvider::reliable(), clock.clone()), "/weather?city=Berlin").await?;
        assert_eq!(status, StatusCode::OK);

        clock.advance(Duration::from_secs(90 * 60));
        exhaust_quota(&store).await;
        let (status, body) =
            get(app(store, MockProvider::reliable(), clock), "/weather?city=Berlin").await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["source"], "stale-cache");
        assert_eq!(body["meta"]["stale"], true);
        Ok(())
    }

    #[tokio::test]
    async fn provider_failure_with_old_entry_serves_stale() -> Result<(), String> {
        let (store, clock) = fixture();
        get(app(store.clone(), MockProvider::reliable(), clock.clone()), "/weather?city=Oslo").await?;

        clock.advance(Duration::from_secs(90 * 60));
        let (status, body) =
            get(app(store, MockProvider::new(1.0), clock), "/weather?city=Oslo").await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["stale"], true);
        Ok(())
    }

    #[tokio::test]
    async fn provider_failure_without_cache_is_503() -> Result<(), String> {
        let (store, clock) = fixture();
        let app = app(store, MockProvider::new(1.0), clock);

        let (status, body) = get(app, "/weather?city=Oslo").await?;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "provider_unavailable");
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_query_is_400() -> Result<(), String> {
        let (store, clock) = fixture();
        let app = app(store.clone(), MockProvider::reliable(), clock);

        let (status, body) = get(app, "/weather?city=Paris&city=Rome").await?;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "validation");
        assert_eq!(body["error"]["message"], "Invalid request query");
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_ok() -> Result<(), String> {
        let (store, clock) = fixture();
        let (status, body) = get(app(store, MockProvider::reliable(), clock), "/health").await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        Ok(())
    }
}
