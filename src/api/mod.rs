//! HTTP API handlers
//!
//! Thin marshalling over the core: handlers validate input, call into the
//! store/orchestrator/selection policy, and shape JSON responses.

pub mod health;
pub mod labels;
pub mod recordings;
pub mod retrain;
pub mod spectrograms;

pub use health::health_routes;
pub use labels::label_routes;
pub use recordings::recording_routes;
pub use retrain::retrain_routes;
pub use spectrograms::spectrogram_routes;
