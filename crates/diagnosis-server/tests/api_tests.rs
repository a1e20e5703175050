//! Integration tests for the diagnosis API endpoints

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use diagnosis_lib::predictor::{Classifier, ClassifierKind};
use diagnosis_lib::{
    health::{components, HealthRegistry},
    load_artifacts, ArtifactBundle, ClassifierOutput, DiseaseId, FeatureVector, PredictionService,
    ScoringError, ServiceConfig,
};
use diagnosis_server::api::{create_router, AppState, CORRELATION_HEADER};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../diagnosis-lib/tests/fixtures");

/// Scores nothing; stands in for a classifier whose weights went bad at runtime
struct Failing {
    inner: Arc<dyn Classifier>,
}

impl Classifier for Failing {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ClassifierKind {
        self.inner.kind()
    }

    fn classes(&self) -> &[DiseaseId] {
        self.inner.classes()
    }

    fn n_features(&self) -> usize {
        self.inner.n_features()
    }

    fn predict_probabilities(&self, _: &FeatureVector) -> Result<ClassifierOutput, ScoringError> {
        Err(ScoringError::InvalidOutput("weights unavailable".to_string()))
    }
}

/// Fixture ensemble with the named classifiers failing every request
fn service_with_failing(names: &[&str]) -> PredictionService {
    let bundle = load_artifacts(Path::new(FIXTURES)).unwrap();
    let classifiers = bundle
        .classifiers
        .into_iter()
        .map(|c| {
            if names.contains(&c.name()) {
                Arc::new(Failing { inner: c }) as Arc<dyn Classifier>
            } else {
                c
            }
        })
        .collect();
    PredictionService::new(
        ArtifactBundle {
            classifiers,
            ..bundle
        },
        ServiceConfig::default(),
    )
    .unwrap()
}

async fn setup_with(service: Option<PredictionService>) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all(&components::ALL).await;

    let state = Arc::new(AppState::new(health_registry));
    if let Some(service) = service {
        assert!(state.install_engine(service));
        state.health_registry.mark_loaded().await;
    }
    (create_router(state.clone()), state)
}

async fn setup_app(loaded: bool) -> (Router, Arc<AppState>) {
    let service = loaded.then(|| {
        PredictionService::from_artifacts(Path::new(FIXTURES), ServiceConfig::default()).unwrap()
    });
    setup_with(service).await
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

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_predict_ranks_fungal_infection_first() {
    let (app, _state) = setup_app(true).await;

    let response = app
        .oneshot(post_json(
            "/predict",
            json!({"symptoms": [{"itching": 1}, {"skin_rash": 1}, {"fatigue": 1}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0]["disease"], "Fungal infection");
    assert_eq!(predictions[0]["probability"], "64.55%");
    assert_eq!(predictions[1]["disease"], "Allergy");
    assert_eq!(predictions[1]["probability"], "26.53%");
    assert_eq!(predictions[2]["disease"], "Malaria");
    assert_eq!(body["degraded"], false);
}

#[tokio::test]
async fn test_predict_accepts_single_object() {
    let (app, _state) = setup_app(true).await;

    let response = app
        .oneshot(post_json(
            "/predict",
            json!({"symptoms": {"itching": true, "skin_rash": "1", "fatigue": 1, "cough": 0}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["predictions"][0]["probability"], "64.55%");
}

#[tokio::test]
async fn test_predict_flags_unrecognized_codes() {
    let (app, _state) = setup_app(true).await;

    let response = app
        .oneshot(post_json(
            "/predict",
            json!({"symptoms": [{"itching": 1}, {"skin_rash": 1}, {"fatigue": 1}, {"glowing_ears": 1}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["degraded"], true);
    assert_eq!(body["unrecognized_symptoms"], 1);
    assert_eq!(body["warnings"][0]["kind"], "unrecognized_symptoms");
    assert_eq!(body["predictions"][0]["probability"], "64.55%");
}

#[tokio::test]
async fn test_predict_empty_input_is_bad_request() {
    let (app, _state) = setup_app(true).await;

    let response = app
        .oneshot(post_json("/predict", json!({"symptoms": [{"itching": 0}]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_input");
}

#[tokio::test]
async fn test_predict_only_unknown_is_bad_request() {
    let (app, _state) = setup_app(true).await;

    let response = app
        .oneshot(post_json("/predict", json!({"symptoms": {"glowing_ears": 1}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_input");
}

#[tokio::test]
async fn test_predict_malformed_body_rejected() {
    let (app, _state) = setup_app(true).await;

    let response = app
        .oneshot(post_json("/predict", json!({"symptoms": 42})))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_symptoms_listed_in_registry_order() {
    let (app, _state) = setup_app(true).await;

    let response = app.oneshot(get("/symptoms")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let symptoms = body.as_array().unwrap();
    assert_eq!(symptoms.len(), 15);
    assert_eq!(symptoms[0]["id"], 0);
    assert_eq!(symptoms[0]["code"], "itching");
    assert_eq!(symptoms[1]["name"], "Skin Rash");
}

#[tokio::test]
async fn test_not_ready_before_startup() {
    let (app, _state) = setup_app(false).await;

    let response = app.clone().oneshot(get("/symptoms")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "not_ready");

    let response = app
        .clone()
        .oneshot(post_json("/predict", json!({"symptoms": {"itching": 1}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"].is_string());
}

#[tokio::test]
async fn test_readyz_ok_after_startup() {
    let (app, _state) = setup_app(true).await;

    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
}

#[tokio::test]
async fn test_healthz_reports_components() {
    let (app, _state) = setup_app(true).await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["components"].get(components::REGISTRY).is_some());
    assert!(health["components"].get(components::CLASSIFIERS).is_some());
    assert!(health["components"].get(components::METADATA).is_some());
}

#[tokio::test]
async fn test_healthz_unavailable_after_failed_startup() {
    let (app, state) = setup_app(false).await;
    state
        .health_registry
        .mark_startup_failed("checksum mismatch for decision_tree.json")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
}

#[tokio::test]
async fn test_correlation_id_echoed() {
    let (app, _state) = setup_app(true).await;

    let request = Request::builder()
        .uri("/healthz")
        .header(CORRELATION_HEADER, "req-1234")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()[CORRELATION_HEADER], "req-1234");

    let response = app.oneshot(get("/healthz")).await.unwrap();
    let generated = response.headers()[CORRELATION_HEADER].to_str().unwrap();
    assert!(!generated.is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state) = setup_app(true).await;

    // Generate at least one prediction so the histogram is populated
    let response = app
        .clone()
        .oneshot(post_json("/predict", json!({"symptoms": {"itching": 1}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("diagnosis_predictions_generated_total"));
    assert!(text.contains("diagnosis_ensemble_info"));
}

#[tokio::test]
async fn test_all_classifiers_failing_is_service_unavailable() {
    let (app, _state) = setup_with(Some(service_with_failing(&[
        "naive_bayes",
        "random_forest",
        "decision_tree",
    ])))
    .await;

    let response = app
        .oneshot(post_json("/predict", json!({"symptoms": {"itching": 1}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["error"], "no_prediction_available");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_partial_vote_loss_reported_and_degrades_classifiers() {
    let (app, _state) = setup_with(Some(service_with_failing(&["naive_bayes"]))).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/predict",
            json!({"symptoms": [{"itching": 1}, {"skin_rash": 1}, {"fatigue": 1}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["degraded"], true);
    assert_eq!(body["warnings"][0]["kind"], "partial_vote_loss");
    assert_eq!(body["warnings"][0]["dropped"], json!(["naive_bayes"]));
    assert_eq!(body["predictions"][0]["probability"], "70.00%");

    let response = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"][components::CLASSIFIERS]["status"], "degraded");

    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_full_ensemble_request_keeps_classifiers_healthy() {
    let (app, state) = setup_app(true).await;
    state
        .health_registry
        .set_degraded(components::CLASSIFIERS, "vote dropped by decision_tree")
        .await;

    let response = app
        .oneshot(post_json("/predict", json!({"symptoms": {"itching": 1}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = state.health_registry.health().await;
    assert_eq!(health.status, diagnosis_lib::ComponentStatus::Healthy);
}
