//! Dataset assembly: the two views the retraining orchestrator works on
//!
//! Both views join the segment store with the feature store. A segment's
//! feature slice is resolved by its ordinal position among its recording's
//! segments ordered by start offset, which is the order the ingestion pipeline
//! wrote the stack in.
//!
//! Fail-fast policy: a missing feature artifact, a stack shorter than the
//! segment grid, or a label outside the vocabulary aborts assembly with a
//! distinguishable error. These are pipeline integrity bugs, not conditions
//! to skip over.

use crate::db;
use crate::features::FeatureStore;
use crate::vocab::LabelVocabulary;
use crate::{Error, Result};
use ndarray::{Array1, Array3, Axis};
use sqlx::SqlitePool;

/// One training example: a feature slice and its multi-hot target
#[derive(Debug)]
pub struct LabeledExample {
    pub features: Array3<f32>,
    pub target: Array1<f32>,
}

/// Labeled-only training view
#[derive(Debug)]
pub struct LabeledView {
    pub examples: Vec<LabeledExample>,
}

impl LabeledView {
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }
}

/// One scoring example: a feature slice and the segment its score belongs to
#[derive(Debug)]
pub struct ScoringExample {
    pub features: Array3<f32>,
    pub segment_id: i64,
}

/// All-segments evaluation view, labeled or not
#[derive(Debug)]
pub struct EvaluationView {
    pub examples: Vec<ScoringExample>,
}

impl EvaluationView {
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }
}

/// Build the labeled training view
pub async fn labeled_view(
    pool: &SqlitePool,
    store: &FeatureStore,
    vocab: &LabelVocabulary,
) -> Result<LabeledView> {
    let mut examples = Vec::new();

    for recording in db::recordings::list_all(pool).await? {
        let segments = db::segments::for_recording(pool, recording.id).await?;
        if segments.iter().all(|s| s.labels.is_none()) {
            // Nothing labeled here; don't touch the (large) feature stack
            continue;
        }

        let stack = store.load_stack(&recording.filename)?;
        for (ordinal, segment) in segments.iter().enumerate() {
            let Some(labels) = &segment.labels else {
                continue;
            };
            let features = slice_stack(&stack, ordinal, &recording.filename)?;
            let target = vocab.multi_hot(labels)?;
            examples.push(LabeledExample { features, target });
        }
    }

    Ok(LabeledView { examples })
}

/// Build the all-segments evaluation view
pub async fn evaluation_view(pool: &SqlitePool, store: &FeatureStore) -> Result<EvaluationView> {
    let mut examples = Vec::new();

    for recording in db::recordings::list_all(pool).await? {
        let segments = db::segments::for_recording(pool, recording.id).await?;
        if segments.is_empty() {
            continue;
        }

        let stack = store.load_stack(&recording.filename)?;
        for (ordinal, segment) in segments.iter().enumerate() {
            let features = slice_stack(&stack, ordinal, &recording.filename)?;
            examples.push(ScoringExample {
                features,
                segment_id: segment.id,
            });
        }
    }

    Ok(EvaluationView { examples })
}

fn slice_stack(
    stack: &ndarray::Array4<f32>,
    ordinal: usize,
    filename: &str,
) -> Result<Array3<f32>> {
    if ordinal >= stack.shape()[0] {
        return Err(Error::Features(format!(
            "segment ordinal {} out of range for '{}' (stack holds {} slices)",
            ordinal,
            filename,
            stack.shape()[0]
        )));
    }
    Ok(stack.index_axis(Axis(0), ordinal).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use ndarray_npy::write_npy;
    use std::collections::HashMap;
    use std::path::Path;

    fn vocab() -> LabelVocabulary {
        let mut map = HashMap::new();
        map.insert("amecro".to_string(), 0);
        map.insert("bkcchi".to_string(), 1);
        LabelVocabulary::new(map).unwrap()
    }

    fn write_stack(dir: &Path, stem: &str, segments: usize) {
        let stack = Array4::from_shape_fn((segments, 3, 8, 8), |(s, c, y, x)| {
            s as f32 + 0.001 * (c + y + x) as f32
        });
        write_npy(dir.join(format!("{stem}.npy")), &stack).unwrap();
    }

    async fn seeded_pool(dir: &Path) -> (SqlitePool, i64) {
        let pool = db::init_pool(&dir.join("chorus.db")).await.unwrap();
        let recording_id = db::recordings::insert(&pool, "rec_COR.ogg", 15.0)
            .await
            .unwrap();
        for i in 0..3 {
            db::segments::insert(&pool, recording_id, i as f64 * 5.0)
                .await
                .unwrap();
        }
        (pool, recording_id)
    }

    #[tokio::test]
    async fn labeled_view_contains_only_labeled_segments() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "rec_COR", 3);
        let (pool, recording_id) = seeded_pool(dir.path()).await;

        let segments = db::segments::for_recording(&pool, recording_id)
            .await
            .unwrap();
        db::segments::apply_labels(&pool, segments[1].id, &["amecro".to_string()])
            .await
            .unwrap();
        db::segments::apply_labels(&pool, segments[2].id, &[])
            .await
            .unwrap();

        let store = FeatureStore::new(dir.path().to_path_buf());
        let view = labeled_view(&pool, &store, &vocab()).await.unwrap();

        assert_eq!(view.len(), 2);
        // Slice for ordinal 1 carries that slice's fill value
        assert!((view.examples[0].features[[0, 0, 0]] - 1.0).abs() < 0.1);
        assert_eq!(view.examples[0].target.to_vec(), vec![1.0, 0.0]);
        // Confirmed no-call trains on an all-zero target
        assert_eq!(view.examples[1].target.sum(), 0.0);
    }

    #[tokio::test]
    async fn evaluation_view_covers_every_segment() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "rec_COR", 3);
        let (pool, recording_id) = seeded_pool(dir.path()).await;

        let segments = db::segments::for_recording(&pool, recording_id)
            .await
            .unwrap();
        db::segments::apply_labels(&pool, segments[0].id, &["bkcchi".to_string()])
            .await
            .unwrap();

        let store = FeatureStore::new(dir.path().to_path_buf());
        let view = evaluation_view(&pool, &store).await.unwrap();

        assert_eq!(view.len(), 3);
        let ids: Vec<i64> = view.examples.iter().map(|e| e.segment_id).collect();
        assert_eq!(
            ids,
            segments.iter().map(|s| s.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn missing_artifact_aborts_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, recording_id) = seeded_pool(dir.path()).await;
        let segments = db::segments::for_recording(&pool, recording_id)
            .await
            .unwrap();
        db::segments::apply_labels(&pool, segments[0].id, &["amecro".to_string()])
            .await
            .unwrap();

        let store = FeatureStore::new(dir.path().join("nowhere"));
        let err = labeled_view(&pool, &store, &vocab()).await.unwrap_err();
        assert!(matches!(err, Error::MissingFeatures { .. }));

        let err = evaluation_view(&pool, &store).await.unwrap_err();
        assert!(matches!(err, Error::MissingFeatures { .. }));
    }

    #[tokio::test]
    async fn unknown_label_aborts_assembly() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "rec_COR", 3);
        let (pool, recording_id) = seeded_pool(dir.path()).await;

        let segments = db::segments::for_recording(&pool, recording_id)
            .await
            .unwrap();
        // Bypasses vocabulary validation, as a corrupted store would
        db::segments::apply_labels(&pool, segments[0].id, &["dodo".to_string()])
            .await
            .unwrap();

        let store = FeatureStore::new(dir.path().to_path_buf());
        let err = labeled_view(&pool, &store, &vocab()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownLabel(_)));
    }

    #[tokio::test]
    async fn short_stack_aborts_assembly() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "rec_COR", 2); // grid has 3 segments
        let (pool, _) = seeded_pool(dir.path()).await;

        let store = FeatureStore::new(dir.path().to_path_buf());
        let err = evaluation_view(&pool, &store).await.unwrap_err();
        assert!(matches!(err, Error::Features(_)));
    }
}
