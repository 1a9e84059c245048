//! # chorus
//!
//! Active-learning annotation backend for bird-call audio. Serves audio and
//! spectrogram segments to human annotators, accepts their labels, and
//! periodically fine-tunes a multi-label classifier in the background so
//! that the segments surfaced next are the ones the model is most uncertain
//! about (MC-dropout mutual information).

pub mod api;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod features;
pub mod model;
pub mod retrain;
pub mod selection;
pub mod vocab;

pub use error::{ApiError, ApiResult, Error, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use config::Settings;
use retrain::Retrainer;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use vocab::LabelVocabulary;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved service settings
    pub settings: Arc<Settings>,
    /// Label vocabulary (species code → class index)
    pub vocab: Arc<LabelVocabulary>,
    /// Retraining orchestrator (owns the classifier and the run status)
    pub retrainer: Arc<Retrainer>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        settings: Arc<Settings>,
        vocab: Arc<LabelVocabulary>,
        retrainer: Arc<Retrainer>,
    ) -> Self {
        Self {
            db,
            settings,
            vocab,
            retrainer,
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let audio_dir = state.settings.audio_dir();

    Router::new()
        .merge(api::label_routes())
        .merge(api::recording_routes())
        .merge(api::retrain_routes())
        .merge(api::spectrogram_routes())
        .merge(api::health_routes())
        // Raw audio with HTTP range support; no transcoding
        .nest_service("/audio", ServeDir::new(audio_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
