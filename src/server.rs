//! HTTP front end: `/predict`, `/example.json`, `/health` and static files.

use crate::error::PredictionError;
use crate::pipeline::GradePredictor;
use crate::request::{dispatch, PredictionRequest, PredictionResponse};
use crate::types::prediction::{GradePrediction, PredictionOutcome};
use crate::types::record::RawRecord;
use axum::extract::{FromRequest, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{debug, warn};

/// Shared state for all handlers
pub struct AppState {
    pub predictor: Arc<GradePredictor>,
    pub max_batch_size: usize,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(predictor: Arc<GradePredictor>, max_batch_size: usize) -> Self {
        Self {
            predictor,
            max_batch_size,
            started_at: Utc::now(),
        }
    }
}

/// Build the axum [`Router`] with all routes.
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/example.json", get(example_handler))
        .route("/health", get(health_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Status for a single-record result. Scoring failures are reported as a
/// normal result; everything else is a bad request.
fn single_response(result: Result<GradePrediction, PredictionError>) -> Response {
    match result {
        Ok(prediction) => Json(PredictionOutcome::Prediction(prediction)).into_response(),
        Err(e @ PredictionError::Scoring(_)) => {
            Json(PredictionOutcome::failure(&e)).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false)
}

/// Handle single JSON, batch JSON and form submissions.
async fn predict_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    if !is_json(&request) {
        let form = Form::<HashMap<String, String>>::from_request(request, &state).await;
        let Form(fields) = match form {
            Ok(form) => form,
            Err(rejection) => {
                return error_response(StatusCode::BAD_REQUEST, &rejection.body_text())
            }
        };
        debug!(fields = fields.len(), "Form submission");
        return single_response(state.predictor.evaluate(&RawRecord::from_form(fields)));
    }

    let Json(payload) = match Json::<Value>::from_request(request, &state).await {
        Ok(json) => json,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };

    match PredictionRequest::from_json(payload, state.max_batch_size) {
        Ok(PredictionRequest::Single(value)) => {
            single_response(state.predictor.evaluate_json(&value))
        }
        Ok(batch @ PredictionRequest::Batch(_)) => match dispatch(&state.predictor, &batch) {
            PredictionResponse::Batch(results) => Json(results).into_response(),
            single => Json(single).into_response(),
        },
        Err(e) => {
            warn!(error = %e, "Rejecting prediction request");
            (StatusCode::BAD_REQUEST, Json(PredictionResponse::rejected(&e))).into_response()
        }
    }
}

/// Two example records for trying the endpoint.
pub fn example_records() -> Value {
    json!([
        {
            "age": 21,
            "gender": "Male",
            "attendance": 88,
            "midterm_score": 75,
            "final_score": 82,
            "assignments_avg": 78,
            "quizzes_avg": 72,
            "participation_score": 8,
            "projects_score": 85,
            "total_score": 78.8,
            "study_hours_per_week": 10,
            "stress_level": 5,
            "sleep_hours_per_night": 7,
            "department": "CS",
            "extracurricular_activities": "Yes",
            "internet_access_at_home": "Yes",
            "parent_education_level": "Bachelor's",
            "family_income_level": "Medium"
        },
        {
            "age": 19,
            "gender": "Female",
            "attendance": 92,
            "midterm_score": 81,
            "final_score": 77,
            "assignments_avg": 85,
            "quizzes_avg": 88,
            "participation_score": 9,
            "projects_score": 90,
            "total_score": 81.7,
            "study_hours_per_week": 14,
            "stress_level": 4,
            "sleep_hours_per_night": 8,
            "department": "Mathematics",
            "extracurricular_activities": "No",
            "internet_access_at_home": "No",
            "parent_education_level": "Master's",
            "family_income_level": "Low"
        }
    ])
}

async fn example_handler() -> impl IntoResponse {
    Json(example_records())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let model_loaded = state.predictor.model_loaded();
    let scaler_loaded = state.predictor.scaler_loaded();
    let status = if model_loaded && scaler_loaded {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "model_loaded": model_loaded,
        "scaler_loaded": scaler_loaded,
        "started_at": state.started_at,
        "version": env!("CARGO_PKG_VERSION"),
        "metrics": state.predictor.metrics().snapshot(),
    }))
}
