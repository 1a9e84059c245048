//! Retraining orchestrator
//!
//! Single-flight background job: fine-tune the head on the labeled view,
//! persist the weights, re-score every segment's uncertainty, append a
//! corpus-wide snapshot. At most one run is in flight at any time.
//!
//! The `Running` state is entered through an atomic compare-and-swap and
//! left through an RAII token drop, so error returns and panics inside the
//! run can never leave the status stuck on `Running`.

use crate::config::TrainingConfig;
use crate::dataset;
use crate::db;
use crate::features::FeatureStore;
use crate::model::{self, Classifier};
use crate::vocab::LabelVocabulary;
use crate::{Error, Result};
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Corpus-level uncertainty pair exposed by the status endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct UncertaintyPair {
    pub current: Option<f64>,
    pub previous: Option<f64>,
}

/// Process-wide retraining status: the single-flight guard plus the
/// uncertainty pair. Owned by the orchestrator, read by status polling.
/// Lifecycle: created once at process start, reset only by restart.
pub struct RetrainStatus {
    running: AtomicBool,
    uncertainty: RwLock<UncertaintyPair>,
}

impl RetrainStatus {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            uncertainty: RwLock::new(UncertaintyPair::default()),
        }
    }

    /// Atomically transition Idle → Running. Returns the run token on
    /// success; None means a run is already in flight.
    pub fn try_begin(self: &Arc<Self>) -> Option<RunToken> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken {
                status: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn uncertainty(&self) -> UncertaintyPair {
        *self.uncertainty.read().await
    }

    /// Shift current → previous and record the new corpus value. Called
    /// before the run token drops, so an observer that sees Idle after a
    /// completed run also sees the new value.
    async fn push_uncertainty(&self, value: f64) {
        let mut pair = self.uncertainty.write().await;
        pair.previous = pair.current;
        pair.current = Some(value);
    }
}

impl Default for RetrainStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for the Running state. Dropping it restores Idle, whether
/// the drop happens normally, on `?`, or during a panic unwind.
pub struct RunToken {
    status: Arc<RetrainStatus>,
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.status.running.store(false, Ordering::Release);
    }
}

/// Summary of one completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub trained_examples: usize,
    pub scored_segments: usize,
    pub mean_mutual_information: f64,
}

/// Retraining orchestrator. Exclusively owns the classifier and its
/// persisted weights.
pub struct Retrainer {
    db: SqlitePool,
    features: FeatureStore,
    vocab: Arc<LabelVocabulary>,
    config: TrainingConfig,
    weights_path: PathBuf,
    classifier: Arc<Mutex<Classifier>>,
    status: Arc<RetrainStatus>,
}

impl Retrainer {
    pub fn new(
        db: SqlitePool,
        features: FeatureStore,
        vocab: Arc<LabelVocabulary>,
        classifier: Classifier,
        config: TrainingConfig,
        weights_path: PathBuf,
    ) -> Self {
        Self {
            db,
            features,
            vocab,
            config,
            weights_path,
            classifier: Arc::new(Mutex::new(classifier)),
            status: Arc::new(RetrainStatus::new()),
        }
    }

    pub fn status(&self) -> &Arc<RetrainStatus> {
        &self.status
    }

    pub fn label_threshold(&self) -> i64 {
        self.config.label_threshold
    }

    /// Fire-and-forget trigger. Returns false (and logs) when a run is
    /// already in flight: concurrent triggers are dropped, not queued.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let Some(token) = self.status.try_begin() else {
            info!("retraining already in progress; trigger ignored");
            return false;
        };

        let retrainer = Arc::clone(self);
        tokio::spawn(async move {
            match retrainer.run(token).await {
                Ok(summary) => info!(
                    trained_examples = summary.trained_examples,
                    scored_segments = summary.scored_segments,
                    mean_mutual_information = summary.mean_mutual_information,
                    "retraining run complete"
                ),
                Err(e) => error!(error = %e, "retraining run failed"),
            }
        });
        true
    }

    /// Run to completion on the caller's task. Returns Ok(None) when a run
    /// is already in flight.
    pub async fn run_once(self: &Arc<Self>) -> Result<Option<RunSummary>> {
        match self.status.try_begin() {
            None => Ok(None),
            Some(token) => self.run(token).await.map(Some),
        }
    }

    /// One full retraining run. The token keeps the status on Running for
    /// the duration and restores Idle when dropped, whatever the outcome.
    async fn run(&self, token: RunToken) -> Result<RunSummary> {
        let _token = token;
        let started = std::time::Instant::now();
        info!("retraining run started");

        // 1-3: fine-tune on the labeled view (skipped when empty) and
        // persist the head, off the request-serving runtime threads
        let labeled = dataset::labeled_view(&self.db, &self.features, &self.vocab).await?;
        if labeled.is_empty() {
            info!("no labeled segments yet; scoring with current weights only");
        } else {
            info!(examples = labeled.len(), "fine-tuning on labeled view");
        }

        let classifier = Arc::clone(&self.classifier);
        let config = self.config.clone();
        let weights_path = self.weights_path.clone();
        let trained_examples = spawn_blocking(move || {
            train_step(&classifier, labeled, &config, &weights_path)
        })
        .await?;

        // 4: score every segment with MC-dropout mutual information
        let evaluation = dataset::evaluation_view(&self.db, &self.features).await?;
        let classifier = Arc::clone(&self.classifier);
        let config = self.config.clone();
        let scores = spawn_blocking(move || score_step(&classifier, evaluation, &config)).await?;

        // All-or-nothing score write-back
        db::segments::write_scores(&self.db, &scores).await?;

        // 5: corpus snapshot and status shift
        let mean_mi = round4(
            scores.iter().map(|(_, mi)| mi).sum::<f64>() / scores.len().max(1) as f64,
        );
        db::snapshots::insert(&self.db, mean_mi).await?;
        self.status.push_uncertainty(mean_mi).await;

        let summary = RunSummary {
            trained_examples,
            scored_segments: scores.len(),
            mean_mutual_information: mean_mi,
        };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            scored = summary.scored_segments,
            "scoring pass committed"
        );
        Ok(summary)
    }
}

async fn spawn_blocking<T: Send + 'static>(
    work: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("retraining task aborted: {}", e)))?
}

/// Lock the classifier for one blocking section. A poisoned lock means an
/// earlier scoring pass panicked; the weights are still consistent (training
/// overwrites them wholesale), so continuing is sound.
fn lock_classifier(classifier: &Mutex<Classifier>) -> std::sync::MutexGuard<'_, Classifier> {
    classifier.lock().unwrap_or_else(|poisoned| {
        warn!("classifier lock poisoned by an earlier panic; continuing");
        poisoned.into_inner()
    })
}

/// Steps 1-3: fine-tune when there is labeled data, then persist the head
fn train_step(
    classifier: &Mutex<Classifier>,
    labeled: dataset::LabeledView,
    config: &TrainingConfig,
    weights_path: &std::path::Path,
) -> Result<usize> {
    let mut model = lock_classifier(classifier);
    let mut rng = StdRng::from_entropy();

    let trained_examples = if labeled.is_empty() {
        0
    } else {
        let report = model::fine_tune(&mut model, &labeled, config, &mut rng)?;
        info!(
            examples = report.examples,
            epochs = report.epochs,
            loss = report.final_epoch_loss,
            "fine-tune finished"
        );
        report.examples
    };

    model.save_weights(weights_path)?;
    Ok(trained_examples)
}

/// Step 4: per-segment mutual information over the evaluation view
fn score_step(
    classifier: &Mutex<Classifier>,
    evaluation: dataset::EvaluationView,
    config: &TrainingConfig,
) -> Result<Vec<(i64, f64)>> {
    let model = lock_classifier(classifier);
    let mut rng = StdRng::from_entropy();

    let mut scores = Vec::with_capacity(evaluation.len());
    for chunk in evaluation.examples.chunks(config.eval_batch_size.max(1)) {
        let views: Vec<_> = chunk.iter().map(|e| e.features.view()).collect();
        let batch = ndarray::stack(Axis(0), &views)
            .map_err(|e| Error::Internal(format!("cannot stack evaluation batch: {}", e)))?;

        let estimate = model.predict_with_uncertainty(batch.view(), config.mc_passes, &mut rng)?;
        for (example, &mi) in chunk.iter().zip(estimate.mutual_information.iter()) {
            scores.push((example.segment_id, round4(mi as f64)));
        }
    }
    Ok(scores)
}

/// Scores are persisted with 4-decimal precision
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round4_truncates_noise() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(-0.00004), -0.0);
        assert_eq!(round4(1.0), 1.0);
    }

    #[tokio::test]
    async fn single_flight_guard_is_exclusive() {
        let status = Arc::new(RetrainStatus::new());

        let token = status.try_begin().expect("first begin succeeds");
        assert!(status.is_running());
        assert!(status.try_begin().is_none(), "second begin must fail");

        drop(token);
        assert!(!status.is_running());
        assert!(status.try_begin().is_some(), "guard is reusable after drop");
    }

    #[tokio::test]
    async fn token_drop_restores_idle_on_unwind() {
        let status = Arc::new(RetrainStatus::new());
        let token = status.try_begin().unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _held = token;
            panic!("run blew up");
        }));
        assert!(result.is_err());
        assert!(!status.is_running(), "panic must not leave status Running");
    }

    #[tokio::test]
    async fn uncertainty_pair_shifts_on_completion() {
        let status = Arc::new(RetrainStatus::new());
        assert!(status.uncertainty().await.current.is_none());

        status.push_uncertainty(0.42).await;
        let pair = status.uncertainty().await;
        assert_eq!(pair.current, Some(0.42));
        assert_eq!(pair.previous, None);

        status.push_uncertainty(0.17).await;
        let pair = status.uncertainty().await;
        assert_eq!(pair.current, Some(0.17));
        assert_eq!(pair.previous, Some(0.42));
    }
}
