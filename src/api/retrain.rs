//! Retraining status, history, and manual trigger

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::ApiResult;
use crate::{db, AppState};

/// GET /api/retrain/status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// "idle" or "running"
    pub state: String,
    pub current_uncertainty: Option<f64>,
    pub previous_uncertainty: Option<f64>,
}

/// GET /api/retrain/history response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Distinct snapshot values in first-seen order
    pub values: Vec<f64>,
}

/// POST /api/retrain/start response
#[derive(Debug, Serialize)]
pub struct StartResponse {
    /// False when a run was already in flight (no-op, not an error)
    pub started: bool,
}

/// GET /api/retrain/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.retrainer.status();
    let pair = status.uncertainty().await;
    Json(StatusResponse {
        state: if status.is_running() {
            "running".to_string()
        } else {
            "idle".to_string()
        },
        current_uncertainty: pair.current,
        previous_uncertainty: pair.previous,
    })
}

/// GET /api/retrain/history
pub async fn get_history(State(state): State<AppState>) -> ApiResult<Json<HistoryResponse>> {
    let values = db::snapshots::distinct_history(&state.db).await?;
    Ok(Json(HistoryResponse { values }))
}

/// POST /api/retrain/start
pub async fn start_retrain(State(state): State<AppState>) -> Json<StartResponse> {
    Json(StartResponse {
        started: state.retrainer.trigger(),
    })
}

/// Build retrain routes
pub fn retrain_routes() -> Router<AppState> {
    Router::new()
        .route("/api/retrain/status", get(get_status))
        .route("/api/retrain/history", get(get_history))
        .route("/api/retrain/start", post(start_retrain))
}
