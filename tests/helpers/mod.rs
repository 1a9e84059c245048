//! Shared test fixtures: a tempdir-backed data root with seeded corpus,
//! feature stacks, vocabulary, and a small classifier configuration.
#![allow(dead_code)]

use chorus::config::{ModelConfig, Settings, TrainingConfig};
use chorus::features::FeatureStore;
use chorus::model::Classifier;
use chorus::retrain::Retrainer;
use chorus::vocab::LabelVocabulary;
use chorus::{db, AppState};
use ndarray::Array4;
use ndarray_npy::write_npy;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestContext {
    /// Keeps the data root alive for the test's duration
    pub dir: TempDir,
    pub settings: Arc<Settings>,
    pub pool: SqlitePool,
    pub retrainer: Arc<Retrainer>,
    pub state: AppState,
    pub app: axum::Router,
}

/// Small but real model/training configuration
pub fn test_settings(root: std::path::PathBuf) -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        root,
        model: ModelConfig {
            pool_grid: 2,
            feature_dim: 16,
            hidden1: 24,
            hidden2: 12,
            dropout: 0.5,
            extractor_seed: 42,
        },
        training: TrainingConfig {
            label_threshold: 3,
            epochs: 2,
            learning_rate: 5e-3,
            weight_decay: 0.01,
            batch_size: 2,
            eval_batch_size: 8,
            mc_passes: 4,
        },
    }
}

/// Write one fake audio file plus its feature stack
pub fn write_recording_fixture(root: &std::path::Path, filename: &str, segments: usize) {
    std::fs::create_dir_all(root.join("audio")).unwrap();
    std::fs::create_dir_all(root.join("features")).unwrap();

    std::fs::write(root.join("audio").join(filename), b"not-really-ogg").unwrap();

    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap();
    // Distinct per-segment texture so uncertainty scores differ
    let stack = Array4::from_shape_fn((segments, 3, 8, 8), |(s, c, y, x)| {
        let phase = (s * 13 + c * 5 + y * 3 + x) as f32;
        0.5 + 0.5 * (phase * 0.37).sin()
    });
    write_npy(root.join("features").join(format!("{stem}.npy")), &stack).unwrap();
}

pub fn write_vocabulary(root: &std::path::Path) {
    std::fs::write(
        root.join("labels.json"),
        r#"{"amecro": 0, "bkcchi": 1, "norcar": 2}"#,
    )
    .unwrap();
}

/// Full context: two recordings (6 + 4 segments), seeded store, router
pub async fn test_context() -> TestContext {
    test_context_with(&[("XC0001_COR.ogg", 6), ("XC0002_SSW.ogg", 4)]).await
}

pub async fn test_context_with(recordings: &[(&str, usize)]) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    for (filename, segments) in recordings {
        write_recording_fixture(dir.path(), filename, *segments);
    }
    write_vocabulary(dir.path());

    let settings = Arc::new(test_settings(dir.path().to_path_buf()));
    let pool = db::init_pool(&settings.database_path()).await.unwrap();

    let features = FeatureStore::new(settings.features_dir());
    db::seed::seed_if_empty(&pool, &settings.audio_dir(), &features)
        .await
        .unwrap();

    let vocab = Arc::new(LabelVocabulary::load(&settings.vocab_path()).unwrap());
    let classifier = Classifier::new(&settings.model, vocab.len());
    let retrainer = Arc::new(Retrainer::new(
        pool.clone(),
        features,
        Arc::clone(&vocab),
        classifier,
        settings.training.clone(),
        settings.weights_path(),
    ));

    let state = AppState::new(
        pool.clone(),
        Arc::clone(&settings),
        vocab,
        Arc::clone(&retrainer),
    );
    let app = chorus::build_router(state.clone());

    TestContext {
        dir,
        settings,
        pool,
        retrainer,
        state,
        app,
    }
}
