//! HTTP error mapping.
//!
//! Engine errors split into three classes on the wire: user-input errors
//! (422), lookups that found nothing (404), and upstream/internal failures
//! (500/502). Upstream error details are logged but never forwarded
//! verbatim.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error};

use fincalc_core::EngineError;

/// A structured problem document returned for every error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Short error class name.
    pub title: String,
    /// Human-readable description of what went wrong.
    pub detail: String,
    /// Present on unknown-metric errors: everything the engine can serve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_metrics: Option<Vec<String>>,
}

/// Engine error with an HTTP mapping.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title, available_metrics) = match &self.0 {
            EngineError::UnknownMetric { available, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unknown-metric",
                Some(available.clone()),
            ),
            EngineError::MissingInput { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "missing-input", None)
            }
            EngineError::UnsafeExpression { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unsafe-expression", None)
            }
            EngineError::UnboundIdentifier { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unbound-identifier", None)
            }
            EngineError::InvalidCalculation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid-calculation", None)
            }
            EngineError::InvalidPeriod(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid-period", None)
            }
            EngineError::CyclicDependency(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "cyclic-dependency", None)
            }
            EngineError::PeriodNotFound { .. } => {
                (StatusCode::NOT_FOUND, "period-not-found", None)
            }
            EngineError::EntityNotFound(_) => (StatusCode::NOT_FOUND, "entity-not-found", None),
            EngineError::Network(_) => (StatusCode::BAD_GATEWAY, "upstream-unreachable", None),
            EngineError::DataUnavailable { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "data-unavailable", None)
            }
            EngineError::Parse(_) | EngineError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", None)
            }
        };

        if self.0.is_user_error() {
            debug!(error = %self.0, "Rejected request");
        }

        // Client errors carry their own message; server-side failures get a
        // generic detail so upstream internals never leak.
        let detail = if status.is_client_error() {
            self.0.to_string()
        } else {
            error!(error = %self.0, "Request failed");
            match &self.0 {
                EngineError::DataUnavailable { ticker, concept, .. } => {
                    format!("data for {ticker}/{concept} is unavailable from every source")
                }
                _ => "the request could not be served".to_string(),
            }
        };

        let problem = Problem {
            title: title.to_string(),
            detail,
            available_metrics,
        };
        (status, Json(problem)).into_response()
    }
}
