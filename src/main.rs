//! chorus - Active-learning annotation backend for bird-call audio
//!
//! Startup order: tracing, settings, database (with one-shot corpus
//! seeding), vocabulary, classifier (loading persisted head weights when
//! present), retraining orchestrator, HTTP server. One fire-and-forget
//! retraining run is kicked before serving so selection never operates on an
//! all-sentinel corpus.

use anyhow::{Context, Result};
use chorus::config::{Cli, Settings};
use chorus::features::FeatureStore;
use chorus::model::Classifier;
use chorus::retrain::Retrainer;
use chorus::vocab::LabelVocabulary;
use chorus::{db, AppState};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Build identification, logged before any slow startup work
    info!(
        "Starting chorus v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();
    let settings = Arc::new(Settings::load(&cli).context("failed to resolve settings")?);
    info!("Data root: {}", settings.root.display());

    std::fs::create_dir_all(&settings.root)
        .with_context(|| format!("cannot create data root {}", settings.root.display()))?;

    let pool = db::init_pool(&settings.database_path())
        .await
        .context("failed to open database")?;
    info!("Database: {}", settings.database_path().display());

    let features = FeatureStore::new(settings.features_dir());
    let seeded = db::seed::seed_if_empty(&pool, &settings.audio_dir(), &features)
        .await
        .context("corpus seeding failed")?;
    if seeded.recordings > 0 {
        info!(
            recordings = seeded.recordings,
            segments = seeded.segments,
            "corpus seeded"
        );
    }

    let vocab = Arc::new(
        LabelVocabulary::load(&settings.vocab_path()).context("failed to load vocabulary")?,
    );
    info!(classes = vocab.len(), "vocabulary loaded");

    let mut classifier = Classifier::new(&settings.model, vocab.len());
    let weights_path = settings.weights_path();
    if weights_path.exists() {
        classifier
            .load_weights(&weights_path)
            .context("failed to load persisted head weights")?;
        info!("Loaded head weights from {}", weights_path.display());
    } else {
        info!("No persisted head weights; starting from a fresh head");
    }

    let retrainer = Arc::new(Retrainer::new(
        pool.clone(),
        features,
        Arc::clone(&vocab),
        classifier,
        settings.training.clone(),
        weights_path,
    ));

    // Score the corpus right away (and train, if labels already exist)
    if cli.skip_startup_retrain {
        info!("Startup retraining run skipped by flag");
    } else {
        retrainer.trigger();
    }

    let state = AppState::new(pool, Arc::clone(&settings), vocab, retrainer);
    let app = chorus::build_router(state);

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("cannot bind {}:{}", settings.host, settings.port))?;
    info!("chorus listening on http://{}:{}", settings.host, settings.port);
    info!(
        "Health check: http://{}:{}/health",
        settings.host, settings.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
