//! Label submission
//!
//! Applies an annotator's label set to a segment and, when the labeled count
//! crosses the configured threshold, kicks a background retraining run. The
//! label write and the trigger are deliberately decoupled: the write stands
//! even when the trigger is refused (run already in flight) or fails.

use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::{db, AppState};

/// POST /api/labels request
#[derive(Debug, Deserialize)]
pub struct SubmitLabelRequest {
    pub recording_id: i64,
    pub segment_id: i64,
    /// Species codes; an empty list confirms "no call"
    pub labels: Vec<String>,
}

/// POST /api/labels response
#[derive(Debug, Serialize)]
pub struct SubmitLabelResponse {
    pub applied: bool,
    pub retrain_triggered: bool,
    pub labeled_count: i64,
}

/// POST /api/labels
pub async fn submit_label(
    State(state): State<AppState>,
    Json(request): Json<SubmitLabelRequest>,
) -> ApiResult<Json<SubmitLabelResponse>> {
    // Vocabulary check first: an unknown species code is a configuration
    // problem and must not end up in the store
    state.vocab.validate(&request.labels)?;

    let segment =
        db::segments::get_in_recording(&state.db, request.recording_id, request.segment_id)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "segment {} in recording {}",
                    request.segment_id, request.recording_id
                ))
            })?;

    db::segments::apply_labels(&state.db, segment.id, &request.labels).await?;

    let labeled_count = db::segments::labeled_count(&state.db).await?;
    info!(
        segment_id = segment.id,
        labels = ?request.labels,
        labeled_count,
        "labels applied"
    );

    // Trigger exactly on threshold multiples. A refused trigger (run already
    // in flight) still leaves the label applied.
    let threshold = state.retrainer.label_threshold();
    let retrain_triggered = if threshold > 0 && labeled_count % threshold == 0 {
        state.retrainer.trigger()
    } else {
        false
    };

    Ok(Json(SubmitLabelResponse {
        applied: true,
        retrain_triggered,
        labeled_count,
    }))
}

/// Build label routes
pub fn label_routes() -> Router<AppState> {
    Router::new().route("/api/labels", post(submit_label))
}
