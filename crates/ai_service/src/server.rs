//! HTTP surface: `/predict`, `/health` and `/metrics`

use crate::metrics::{MetricsCollector, RequestOutcome};
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use penguin_ai_core::{CoreError, EncodingError, FeatureRecord, LoadedModel, VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Shared, read-only handler state
#[derive(Debug, Clone)]
pub struct AppState {
    /// `None` only when serving without a model
    pub model: Option<Arc<LoadedModel>>,
    pub metrics: MetricsCollector,
    pub confidence_decimals: u32,
}

impl AppState {
    pub fn new(model: Option<Arc<LoadedModel>>, confidence_decimals: u32) -> Self {
        let labels = model
            .as_ref()
            .map(|m| m.metadata().class_labels.clone())
            .unwrap_or_default();
        let metrics = MetricsCollector::new(labels);
        metrics.set_model_loaded(model.is_some());
        Self {
            model,
            metrics,
            confidence_decimals,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(handle_predict))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    #[serde(default)]
    include_probabilities: Option<String>,
}

impl PredictQuery {
    /// Absent or empty means false; anything unparseable is a 400
    fn include_probabilities(&self) -> Result<bool, ApiError> {
        let Some(raw) = self.include_probabilities.as_deref().map(str::trim) else {
            return Ok(false);
        };
        if raw.is_empty() {
            return Ok(false);
        }
        parse_flag(raw).ok_or_else(|| {
            ApiError::invalid_query(
                "include_probabilities",
                format!("expected true or false, got '{raw}'"),
            )
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") || value == "0"
    {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub predicted_species: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub source: Option<String>,
    pub location: Option<String>,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldErrorBody {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldErrorBody>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
    errors: Vec<FieldErrorBody>,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, detail: S) -> Self {
        Self {
            status,
            detail: detail.into(),
            errors: Vec::new(),
        }
    }

    fn invalid_query(field: &str, message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: "invalid query string".to_string(),
            errors: vec![FieldErrorBody {
                field: field.to_string(),
                message,
            }],
        }
    }

    fn outcome(&self) -> RequestOutcome {
        match self.status {
            StatusCode::BAD_REQUEST => RequestOutcome::Rejected,
            StatusCode::SERVICE_UNAVAILABLE => RequestOutcome::Unavailable,
            _ => RequestOutcome::Failed,
        }
    }
}

impl From<EncodingError> for ApiError {
    fn from(err: EncodingError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: "invalid feature record".to_string(),
            errors: err
                .violations
                .iter()
                .map(|v| FieldErrorBody {
                    field: v.field().to_string(),
                    message: v.to_string(),
                })
                .collect(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Encoding(err) => err.into(),
            other => {
                error!(error = %other, "Prediction failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "prediction failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            detail: self.detail,
            errors: self.errors,
        });
        (self.status, payload).into_response()
    }
}

async fn handle_predict(
    State(state): State<AppState>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let result = query
        .map_err(|rejection| ApiError::invalid_query("query", rejection.body_text()))
        .and_then(|Query(query)| predict(&state, &query, &body));
    match result {
        Ok(response) => {
            state
                .metrics
                .record_request(RequestOutcome::Success, started.elapsed());
            state.metrics.record_prediction(&response.predicted_species);
            Json(response).into_response()
        }
        Err(err) => {
            state.metrics.record_request(err.outcome(), started.elapsed());
            err.into_response()
        }
    }
}

fn predict(state: &AppState, query: &PredictQuery, body: &[u8]) -> Result<PredictResponse, ApiError> {
    let Some(model) = state.model.as_ref() else {
        warn!("Prediction requested without a loaded model");
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "model not loaded",
        ));
    };
    let include_probabilities = query.include_probabilities()?;

    let value: Value = serde_json::from_slice(body).map_err(|err| ApiError {
        status: StatusCode::BAD_REQUEST,
        detail: "malformed JSON body".to_string(),
        errors: vec![FieldErrorBody {
            field: "body".to_string(),
            message: err.to_string(),
        }],
    })?;

    let record = FeatureRecord::from_json(&value)?;
    let result = model.predict(&record, state.confidence_decimals)?;
    debug!(
        species = %result.predicted_species,
        confidence = result.confidence,
        "Prediction served"
    );

    let probabilities = include_probabilities.then(|| {
        model
            .metadata()
            .class_labels
            .iter()
            .cloned()
            .zip(result.probabilities.iter().copied())
            .collect()
    });

    Ok(PredictResponse {
        predicted_species: result.predicted_species,
        confidence: result.confidence,
        probabilities,
    })
}

async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, body) = match state.model.as_ref() {
        Some(model) => (
            StatusCode::OK,
            HealthResponse {
                status: "ok".to_string(),
                model_loaded: true,
                source: Some(model.provenance().to_string()),
                location: Some(model.location().to_string()),
                version: VERSION.to_string(),
            },
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse {
                status: "unavailable".to_string(),
                model_loaded: false,
                source: None,
                location: None,
                version: VERSION.to_string(),
            },
        ),
    };
    (status, Json(body))
}

async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.get_snapshot().to_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use penguin_ai_core::FieldViolation;

    #[test]
    fn encoding_errors_list_every_field() {
        let err = ApiError::from(EncodingError::new(vec![
            FieldViolation::Missing {
                field: "year".to_string(),
            },
            FieldViolation::NonFinite {
                field: "body_mass_g".to_string(),
            },
        ]));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.outcome(), RequestOutcome::Rejected);
        let fields: Vec<_> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["year", "body_mass_g"]);
        assert_eq!(err.errors[0].message, "field required");
    }

    #[test]
    fn inference_errors_hide_details() {
        let err = ApiError::from(CoreError::Inference("vector length 3 != 7".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail, "prediction failed");
        assert_eq!(err.outcome(), RequestOutcome::Failed);
    }

    #[test]
    fn include_probabilities_flag_parsing() {
        let query = |value: Option<&str>| PredictQuery {
            include_probabilities: value.map(str::to_string),
        };
        assert!(!query(None).include_probabilities().unwrap());
        assert!(!query(Some("")).include_probabilities().unwrap());
        assert!(query(Some("true")).include_probabilities().unwrap());
        assert!(query(Some("1")).include_probabilities().unwrap());
        assert!(!query(Some("No")).include_probabilities().unwrap());

        let err = query(Some("maybe")).include_probabilities().unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.errors[0].field, "include_probabilities");
    }

    #[test]
    fn state_without_model_reports_unloaded() {
        let state = AppState::new(None, 6);
        assert!(!state.metrics.get_snapshot().model_loaded);
        let err = predict(&state, &PredictQuery::default(), b"{}").unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
