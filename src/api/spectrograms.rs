//! Precomputed spectrogram image serving
//!
//! The ingestion pipeline renders one PNG per segment at
//! `<spectrogram_dir>/<recording_stem>/<ordinal>.png`. This endpoint only
//! looks the file up and streams it; rendering stays out of scope.

use axum::{
    extract::{Path as AxumPath, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::path::Path;

use crate::error::{ApiError, ApiResult};
use crate::{db, AppState};

/// GET /spectrograms/{recording_id}/{ordinal}
pub async fn get_spectrogram(
    State(state): State<AppState>,
    AxumPath((recording_id, ordinal)): AxumPath<(i64, u32)>,
) -> ApiResult<impl IntoResponse> {
    let recording = db::recordings::get(&state.db, recording_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("recording {}", recording_id)))?;

    let stem = Path::new(&recording.filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(recording.filename.as_str())
        .to_string();
    let path = state
        .settings
        .spectrogram_dir()
        .join(&stem)
        .join(format!("{}.png", ordinal));

    let bytes = tokio::fs::read(&path).await.map_err(|_| {
        ApiError::NotFound(format!(
            "spectrogram {} for recording {}",
            ordinal, recording_id
        ))
    })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

/// Build spectrogram routes
pub fn spectrogram_routes() -> Router<AppState> {
    Router::new().route(
        "/spectrograms/:recording_id/:ordinal",
        get(get_spectrogram),
    )
}
