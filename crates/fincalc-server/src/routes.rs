//! HTTP API routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use fincalc_core::{CalculationResult, PeriodSelector, Ticker};
use fincalc_engine::Engine;

use crate::error::ApiError;

/// Application state shared across handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The calculation engine serving every request.
    pub engine: Arc<Engine>,
}

impl AppState {
    /// Creates state around an engine.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(list_metrics))
        .route("/calc/:ticker/:metric", get(calculate))
        .route("/explain", post(explain))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fincalc",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "metrics": state.engine.available_metrics()
    }))
}

#[derive(Debug, Deserialize)]
struct CalcParams {
    /// Period selector: `latest` (default), `YYYY`, or `YYYY-Qn`.
    period: Option<String>,
    /// When true, cross-check every input against all sources.
    #[serde(default)]
    validate: bool,
}

/// Calculation result echoed back with the normalized ticker.
#[derive(Debug, Serialize)]
struct CalcResponse {
    ticker: Ticker,
    #[serde(flatten)]
    result: CalculationResult,
}

async fn calculate(
    State(state): State<AppState>,
    Path((ticker, metric)): Path<(String, String)>,
    Query(params): Query<CalcParams>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = Ticker::new(&ticker);
    let selector: PeriodSelector = params.period.as_deref().unwrap_or("latest").parse()?;
    debug!(%ticker, metric, %selector, validate = params.validate, "calc request");

    let result = state
        .engine
        .calculate(&ticker, &metric, &selector, params.validate)
        .await?;
    Ok(Json(CalcResponse { ticker, result }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainRequest {
    ticker: String,
    expression: String,
    /// Defaults to the latest available period.
    period: Option<String>,
}

async fn explain(
    State(state): State<AppState>,
    Json(request): Json<ExplainRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = Ticker::new(&request.ticker);
    let selector: PeriodSelector = request.period.as_deref().unwrap_or("latest").parse()?;
    debug!(%ticker, expression = %request.expression, %selector, "explain request");

    let explanation = state
        .engine
        .explain(&ticker, &request.expression, &selector)
        .await?;
    Ok(Json(explanation))
}
