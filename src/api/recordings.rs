//! Recording listing and next-segment selection

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::SEGMENT_SECONDS;
use crate::db::segments::Segment;
use crate::error::{ApiError, ApiResult};
use crate::selection::{self, SelectionMode};
use crate::{db, AppState};

/// Wire form of one segment
#[derive(Debug, Serialize)]
pub struct SegmentPayload {
    pub id: i64,
    pub start_time: f64,
    pub uncertainty: f64,
    /// None = unlabeled; [] = confirmed no call
    pub labels: Option<Vec<String>>,
    pub spectrogram_url: String,
}

impl SegmentPayload {
    fn from_segment(segment: &Segment) -> Self {
        let ordinal = (segment.t_start / SEGMENT_SECONDS) as i64;
        Self {
            id: segment.id,
            start_time: segment.t_start,
            uncertainty: segment.uncertainty,
            labels: segment.labels.clone(),
            spectrogram_url: format!("/spectrograms/{}/{}", segment.recording_id, ordinal),
        }
    }
}

/// GET /api/recordings response element
#[derive(Debug, Serialize)]
pub struct RecordingSummaryPayload {
    pub id: i64,
    pub filename: String,
    pub duration: f64,
    pub segment_count: i64,
    pub labeled_count: i64,
}

/// GET /api/recordings/{id} response
#[derive(Debug, Serialize)]
pub struct RecordingDetailResponse {
    pub id: i64,
    pub filename: String,
    pub duration: f64,
    pub audio_url: String,
    pub segments: Vec<SegmentPayload>,
}

#[derive(Debug, Deserialize)]
pub struct NextParams {
    /// coarse | windowed; windowed when omitted
    pub mode: Option<SelectionMode>,
}

/// GET /api/recordings/{id}/next response
#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub recording_id: i64,
    pub mode: SelectionMode,
    /// True when every segment is labeled; segments is then empty
    pub exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_segment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_end: Option<f64>,
    pub audio_url: String,
    pub segments: Vec<SegmentPayload>,
}

/// GET /api/recordings
pub async fn list_recordings(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<RecordingSummaryPayload>>> {
    let summaries = db::recordings::list_summaries(&state.db).await?;
    Ok(Json(
        summaries
            .into_iter()
            .map(|s| RecordingSummaryPayload {
                id: s.id,
                filename: s.filename,
                duration: s.duration,
                segment_count: s.segment_count,
                labeled_count: s.labeled_count,
            })
            .collect(),
    ))
}

/// GET /api/recordings/{id}
pub async fn get_recording(
    State(state): State<AppState>,
    Path(recording_id): Path<i64>,
) -> ApiResult<Json<RecordingDetailResponse>> {
    let recording = db::recordings::get(&state.db, recording_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("recording {}", recording_id)))?;
    let segments = db::segments::for_recording(&state.db, recording_id).await?;

    Ok(Json(RecordingDetailResponse {
        id: recording.id,
        audio_url: audio_url(&recording.filename),
        filename: recording.filename,
        duration: recording.duration,
        segments: segments.iter().map(SegmentPayload::from_segment).collect(),
    }))
}

/// GET /api/recordings/{id}/next?mode=coarse|windowed
///
/// Pure read: repeated calls without intervening label writes return the
/// same selection.
pub async fn select_next(
    State(state): State<AppState>,
    Path(recording_id): Path<i64>,
    Query(params): Query<NextParams>,
) -> ApiResult<Json<SelectionResponse>> {
    let recording = db::recordings::get(&state.db, recording_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("recording {}", recording_id)))?;
    let segments = db::segments::for_recording(&state.db, recording_id).await?;

    let mode = params.mode.unwrap_or(SelectionMode::Windowed);
    let response = match selection::select_next(&segments, mode) {
        None => SelectionResponse {
            recording_id,
            mode,
            exhausted: true,
            focus_segment_id: None,
            window_start: None,
            window_end: None,
            audio_url: audio_url(&recording.filename),
            segments: Vec::new(),
        },
        Some(selection) => SelectionResponse {
            recording_id,
            mode,
            exhausted: false,
            focus_segment_id: Some(selection.focus.id),
            window_start: Some(selection.window_start),
            window_end: Some(selection.window_end),
            audio_url: audio_url(&recording.filename),
            segments: selection
                .segments
                .iter()
                .map(|s| SegmentPayload::from_segment(s))
                .collect(),
        },
    };

    Ok(Json(response))
}

fn audio_url(filename: &str) -> String {
    format!("/audio/{}", filename)
}

/// Build recording routes
pub fn recording_routes() -> Router<AppState> {
    Router::new()
        .route("/api/recordings", get(list_recordings))
        .route("/api/recordings/:recording_id", get(get_recording))
        .route("/api/recordings/:recording_id/next", get(select_next))
}
