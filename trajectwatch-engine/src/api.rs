use std::future::Future;
use std::path::PathBuf;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;
use trajectwatch_core::{ProviderKind, WatchConfig};
use trajectwatch_protocol::{Snapshot, Traject, TrajectSpec, TravelMode, ValidationError};

use crate::error::EngineError;
use crate::history::{HistoryQuery, HistoryView};
use crate::service::TrajectService;
use crate::store::TrajectDefaults;

/// Service settings that are safe to show to dashboard clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub default_mode: TravelMode,
    pub default_interval_minutes: f64,
    pub provider: String,
    pub traffic_aware: bool,
}

impl ConfigSummary {
    fn from_defaults(defaults: TrajectDefaults) -> Self {
        Self {
            default_mode: defaults.mode,
            default_interval_minutes: defaults.interval_minutes,
            provider: ProviderKind::default().as_str().to_string(),
            traffic_aware: true,
        }
    }
}

impl From<&WatchConfig> for ConfigSummary {
    fn from(config: &WatchConfig) -> Self {
        Self {
            default_mode: config.default_mode,
            default_interval_minutes: config.default_interval_minutes,
            provider: config.provider.as_str().to_string(),
            traffic_aware: config.traffic_aware,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Clone)]
struct ApiState {
    service: TrajectService,
    settings: ConfigSummary,
}

/// Composes the dashboard-facing router.
pub struct TrajectApiBuilder {
    state: ApiState,
    public_dir: Option<PathBuf>,
}

impl TrajectApiBuilder {
    pub fn new(service: TrajectService) -> Self {
        let settings = ConfigSummary::from_defaults(service.defaults());
        Self {
            state: ApiState { service, settings },
            public_dir: None,
        }
    }

    pub fn config_summary(mut self, settings: ConfigSummary) -> Self {
        self.state.settings = settings;
        self
    }

    /// Serves static dashboard files from `dir` for every non-API path.
    pub fn public_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.public_dir = dir;
        self
    }

    pub fn into_router(self) -> Router {
        let router = Router::new()
            .route("/api/health", get(health))
            .route("/api/config", get(config))
            .route("/api/trajects", get(list_trajects).post(register_traject))
            .route("/api/eta", get(eta))
            .route("/api/history", get(history))
            .with_state(self.state);

        let router = match self.public_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        };

        router.layer(TraceLayer::new_for_http())
    }

    /// Binds `bind_address` and serves until `shutdown` resolves.
    pub async fn serve<F>(self, bind_address: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(bind_address).await?;
        info!(address = %listener.local_addr()?, "starting trajectwatch api");
        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    #[serde(flatten)]
    settings: ConfigSummary,
    traject_count: usize,
}

async fn config(State(state): State<ApiState>) -> impl IntoResponse {
    let traject_count = state.service.list().await.len();
    Json(ConfigResponse {
        settings: state.settings,
        traject_count,
    })
}

async fn list_trajects(State(state): State<ApiState>) -> Json<Vec<Traject>> {
    Json(state.service.list().await)
}

async fn register_traject(
    State(state): State<ApiState>,
    body: Result<Json<TrajectSpec>, JsonRejection>,
) -> Result<(StatusCode, Json<Traject>), ApiError> {
    let Json(spec) = body.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: "invalid_traject".into(),
                message: rejection.body_text(),
            }),
        )
    })?;
    let traject = state.service.register(spec).await.map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(traject)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrajectParams {
    #[serde(default, alias = "id")]
    traject_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EtaResponse {
    traject_id: String,
    last: Snapshot,
}

async fn eta(
    State(state): State<ApiState>,
    Query(params): Query<TrajectParams>,
) -> Result<Json<EtaResponse>, ApiError> {
    let (traject, last) = state
        .service
        .last_known(params.traject_id.as_deref())
        .await
        .map_err(map_error)?;
    Ok(Json(EtaResponse {
        traject_id: traject.id,
        last,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    #[serde(default, alias = "id")]
    traject_id: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

impl HistoryParams {
    fn query(&self) -> Result<HistoryQuery, ApiError> {
        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| bad_query(format!("date must be YYYY-MM-DD, got {raw:?}")))?,
            ),
            None => None,
        };
        let limit = match self.limit.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(raw) => Some(
                raw.parse::<usize>()
                    .map_err(|_| bad_query(format!("limit must be a non-negative integer, got {raw:?}")))?,
            ),
            None => None,
        };
        Ok(HistoryQuery { date, limit })
    }
}

async fn history(
    State(state): State<ApiState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.query()?;
    let view: HistoryView = state
        .service
        .history(params.traject_id.as_deref(), &query)
        .await
        .map_err(map_error)?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(view)))
}

fn bad_query(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            code: "invalid_query".into(),
            message,
        }),
    )
}

fn map_error(err: EngineError) -> ApiError {
    let (status, code) = match &err {
        EngineError::Validation(ValidationError::DuplicateId(_)) => {
            (StatusCode::CONFLICT, "duplicate_id")
        }
        EngineError::Validation(ValidationError::DuplicateLogFile(_)) => {
            (StatusCode::CONFLICT, "duplicate_log_file")
        }
        EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_traject"),
        EngineError::TrajectNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        EngineError::NoTrajects => (StatusCode::NOT_FOUND, "no_trajects"),
        EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    };
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MeasurementLog;
    use crate::provider::{ProviderError, RouteOutcome, RouteProvider, RouteRequest};
    use crate::scheduler::TrajectScheduler;
    use crate::store::TrajectStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Offline;

    #[async_trait]
    impl RouteProvider for Offline {
        async fn route(&self, _request: &RouteRequest) -> Result<RouteOutcome, ProviderError> {
            Err(ProviderError::Http("offline".into()))
        }
    }

    fn router(dir: &std::path::Path) -> Router {
        let store = TrajectStore::new(dir.join("trajects.json"), TrajectDefaults::default());
        let scheduler = TrajectScheduler::new(Arc::new(Offline), MeasurementLog::new(dir));
        TrajectApiBuilder::new(TrajectService::new(store, scheduler)).into_router()
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(&router(dir.path()), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "ok": true }));
    }

    #[tokio::test]
    async fn config_never_exposes_the_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(&router(dir.path()), get("/api/config")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["defaultMode"], "driving");
        assert_eq!(body["trajectCount"], 0);
        assert!(!body.to_string().to_lowercase().contains("key"));
    }

    #[tokio::test]
    async fn eta_without_trajects_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(&router(dir.path()), get("/api/eta")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_trajects");
    }

    #[tokio::test]
    async fn registration_errors_map_to_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());

        let (status, body) = call(
            &router,
            post_json("/api/trajects", serde_json::json!({ "origin": " ", "destination": "B" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_traject");

        let spec = serde_json::json!({ "id": "ab", "origin": "A", "destination": "B" });
        let (status, _) = call(&router, post_json("/api/trajects", spec.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&router, post_json("/api/trajects", spec)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "duplicate_id");
    }

    #[tokio::test]
    async fn malformed_registration_bodies_are_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());

        let (status, body) = call(
            &router,
            post_json("/api/trajects", serde_json::json!({ "origin": 5, "destination": "B" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_traject");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

        let garbled = Request::builder()
            .method("POST")
            .uri("/api/trajects")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ origin: A"))
            .unwrap();
        let (status, body) = call(&router, garbled).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_traject");

        let untyped = Request::builder()
            .method("POST")
            .uri("/api/trajects")
            .body(Body::from(r#"{"origin":"A","destination":"B"}"#))
            .unwrap();
        let (status, body) = call(&router, untyped).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_traject");

        let (_, listed) = call(&router, get("/api/trajects")).await;
        assert_eq!(listed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn shared_log_file_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());

        let first = serde_json::json!({ "id": "x", "origin": "A", "destination": "B" });
        let (status, _) = call(&router, post_json("/api/trajects", first)).await;
        assert_eq!(status, StatusCode::CREATED);

        let second = serde_json::json!({ "id": "y", "origin": "C", "destination": "D", "logFile": "x.csv" });
        let (status, body) = call(&router, post_json("/api/trajects", second)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "duplicate_log_file");

        let reserved = serde_json::json!({ "id": "z", "origin": "C", "destination": "D", "logFile": "trajects.json" });
        let (status, body) = call(&router, post_json("/api/trajects", reserved)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_traject");
    }

    #[tokio::test]
    async fn history_rejects_bad_dates() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(&router(dir.path()), get("/api/history?date=yesterday")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_query");
    }
}
