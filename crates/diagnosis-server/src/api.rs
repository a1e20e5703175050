//! HTTP API: prediction, symptom listing, health checks and Prometheus metrics

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use diagnosis_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    PredictionError, PredictionResponse, PredictionService, PredictionWarning, Symptom,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Request header carrying the caller's correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    engine: OnceLock<Arc<PredictionService>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self {
            health_registry,
            engine: OnceLock::new(),
        }
    }

    /// Publish the loaded engine; returns false if one was already installed
    pub fn install_engine(&self, engine: PredictionService) -> bool {
        self.engine.set(Arc::new(engine)).is_ok()
    }

    fn engine(&self) -> Result<&Arc<PredictionService>, ApiError> {
        self.engine.get().ok_or(ApiError::NotReady)
    }
}

/// Body of `POST /predict`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub symptoms: SymptomsField,
}

/// `[{"itching": 1}, ...]` or `{"itching": 1, ...}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SymptomsField {
    List(Vec<Map<String, Value>>),
    Object(Map<String, Value>),
}

impl SymptomsField {
    /// Codes flagged present, in request order for both forms
    pub fn reported_codes(&self) -> Vec<String> {
        let entries: Box<dyn Iterator<Item = (&String, &Value)>> = match self {
            SymptomsField::List(items) => Box::new(items.iter().flat_map(|m| m.iter())),
            SymptomsField::Object(map) => Box::new(map.iter()),
        };
        entries
            .filter(|(_, flag)| is_truthy(flag))
            .map(|(code, _)| code.clone())
            .collect()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false")
        }
        _ => false,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Errors surfaced to HTTP callers
#[derive(Debug)]
pub enum ApiError {
    NotReady,
    Prediction(PredictionError),
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        ApiError::Prediction(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_ready",
                "model artifacts are still loading".to_string(),
            ),
            ApiError::Prediction(err) => {
                let status = match err {
                    PredictionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    PredictionError::NoPredictionAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.tag(), err.to_string())
            }
        };
        (
            status,
            Json(ErrorBody {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

async fn list_symptoms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Symptom>>, ApiError> {
    let engine = state.engine()?;
    Ok(Json(engine.list_symptoms().to_vec()))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let engine = state.engine()?.clone();
    let codes = request.symptoms.reported_codes();
    match engine.predict(&codes) {
        Ok(response) => {
            record_vote_health(&state.health_registry, &response).await;
            Ok(Json(response))
        }
        Err(err) => {
            warn!(error = %err, tag = err.tag(), reported = codes.len(), "Prediction rejected");
            Err(err.into())
        }
    }
}

/// Classifiers are degraded while requests lose votes; a full ensemble restores them
async fn record_vote_health(health: &HealthRegistry, response: &PredictionResponse) {
    let dropped = response.warnings.iter().find_map(|w| match w {
        PredictionWarning::PartialVoteLoss { dropped } => Some(dropped),
        _ => None,
    });
    match dropped {
        Some(dropped) => {
            health
                .set_degraded(
                    components::CLASSIFIERS,
                    format!("vote dropped by {}", dropped.join(", ")),
                )
                .await
        }
        None => health.set_healthy(components::CLASSIFIERS).await,
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once artifacts are loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Runs each request in a span tagged with its correlation id and echoes the id back
async fn correlation_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id);

    let span = info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/symptoms", get(list_symptoms))
        .route("/predict", post(predict))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(correlation_id))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
