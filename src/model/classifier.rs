//! Classifier: frozen extractor + trainable head
//!
//! `predict` is a plain deterministic forward pass. `predict_with_uncertainty`
//! computes the extractor pass once, then repeats the head with fresh dropout
//! masks and feeds the per-pass probabilities to the BALD estimator. Whether
//! dropout is active is decided per call; the instance carries no mode state.

use super::extractor::FeatureExtractor;
use super::head::{sigmoid, Head};
use super::uncertainty::{self, UncertaintyEstimate};
use crate::config::ModelConfig;
use crate::{Error, Result};
use ndarray::{Array2, Array3, ArrayView4, Axis};
use ndarray_npy::{NpzReader, NpzWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::path::Path;

pub struct Classifier {
    pub(crate) extractor: FeatureExtractor,
    pub(crate) head: Head,
}

impl Classifier {
    /// Fresh classifier: deterministic frozen extractor, randomly
    /// initialized head
    pub fn new(config: &ModelConfig, num_classes: usize) -> Self {
        let extractor = FeatureExtractor::new(config);
        // Head init is seeded off the extractor seed so a fresh process is
        // reproducible until the first trained artifact lands
        let mut rng = StdRng::seed_from_u64(config.extractor_seed.wrapping_add(1));
        let head = Head::new(
            extractor.out_features(),
            config.hidden1,
            config.hidden2,
            num_classes,
            config.dropout,
            &mut rng,
        );
        Self { extractor, head }
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    /// Deterministic per-class probabilities for a (batch, 3, H, W) input
    pub fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let features = self.extractor.extract(batch)?;
        Ok(self.head.forward(features.view()).mapv(sigmoid))
    }

    /// MC-dropout inference: the extractor runs once, the head runs
    /// `num_passes` times with dropout active. Requires `num_passes ≥ 2`;
    /// with a single pass there is no disagreement to measure.
    pub fn predict_with_uncertainty<R: Rng>(
        &self,
        batch: ArrayView4<'_, f32>,
        num_passes: usize,
        rng: &mut R,
    ) -> Result<UncertaintyEstimate> {
        if num_passes < 2 {
            return Err(Error::InvalidInput(format!(
                "uncertainty estimation needs at least 2 stochastic passes, got {}",
                num_passes
            )));
        }

        let features = self.extractor.extract(batch)?;
        let (batch_size, classes) = (features.nrows(), self.head.num_classes());

        let mut probs = Array3::zeros((num_passes, batch_size, classes));
        for pass in 0..num_passes {
            let logits = self.head.forward_stochastic(features.view(), rng);
            probs
                .index_axis_mut(Axis(0), pass)
                .assign(&logits.mapv(sigmoid));
        }

        Ok(uncertainty::estimate(&probs))
    }

    /// Persist the head's weights (the extractor is frozen and derived from
    /// configuration, so it is never stored)
    pub fn save_weights(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut npz = NpzWriter::new(file);
        npz.add_array("w1", &self.head.w1).map_err(write_err)?;
        npz.add_array("b1", &self.head.b1).map_err(write_err)?;
        npz.add_array("w2", &self.head.w2).map_err(write_err)?;
        npz.add_array("b2", &self.head.b2).map_err(write_err)?;
        npz.add_array("w3", &self.head.w3).map_err(write_err)?;
        npz.add_array("b3", &self.head.b3).map_err(write_err)?;
        npz.finish().map_err(write_err)?;
        Ok(())
    }

    /// Load head weights persisted by a previous run. Shape mismatches (for
    /// example a changed vocabulary) are configuration errors, not silent
    /// reinitialization.
    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let mut npz = NpzReader::new(file).map_err(read_err)?;

        let w1: Array2<f32> = npz.by_name("w1").map_err(read_err)?;
        let b1 = npz.by_name("b1").map_err(read_err)?;
        let w2: Array2<f32> = npz.by_name("w2").map_err(read_err)?;
        let b2 = npz.by_name("b2").map_err(read_err)?;
        let w3: Array2<f32> = npz.by_name("w3").map_err(read_err)?;
        let b3 = npz.by_name("b3").map_err(read_err)?;

        if w1.dim() != self.head.w1.dim()
            || w2.dim() != self.head.w2.dim()
            || w3.dim() != self.head.w3.dim()
        {
            return Err(Error::ModelArtifact(format!(
                "stored head {:?}/{:?}/{:?} does not match configured {:?}/{:?}/{:?}",
                w1.dim(),
                w2.dim(),
                w3.dim(),
                self.head.w1.dim(),
                self.head.w2.dim(),
                self.head.w3.dim()
            )));
        }

        self.head.w1 = w1;
        self.head.b1 = b1;
        self.head.w2 = w2;
        self.head.b2 = b2;
        self.head.w3 = w3;
        self.head.b3 = b3;
        Ok(())
    }
}

fn write_err(e: ndarray_npy::WriteNpzError) -> Error {
    Error::ModelArtifact(format!("cannot write weights: {}", e))
}

fn read_err(e: ndarray_npy::ReadNpzError) -> Error {
    Error::ModelArtifact(format!("cannot read weights: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn small_config() -> ModelConfig {
        ModelConfig {
            pool_grid: 2,
            feature_dim: 8,
            hidden1: 16,
            hidden2: 8,
            dropout: 0.5,
            extractor_seed: 99,
        }
    }

    fn batch() -> Array4<f32> {
        Array4::from_shape_fn((3, 3, 8, 8), |(n, c, y, x)| {
            ((n * 31 + c * 7 + y * 3 + x) % 17) as f32 / 17.0
        })
    }

    #[test]
    fn predict_outputs_probabilities() {
        let classifier = Classifier::new(&small_config(), 4);
        let probs = classifier.predict(batch().view()).unwrap();
        assert_eq!(probs.dim(), (3, 4));
        for &p in probs.iter() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn predict_is_deterministic_after_stochastic_inference() {
        let classifier = Classifier::new(&small_config(), 4);
        let mut rng = StdRng::seed_from_u64(1);

        let before = classifier.predict(batch().view()).unwrap();
        classifier
            .predict_with_uncertainty(batch().view(), 6, &mut rng)
            .unwrap();
        let after = classifier.predict(batch().view()).unwrap();
        // No mode state leaks out of the stochastic call
        assert_eq!(before, after);
    }

    #[test]
    fn uncertainty_requires_two_passes() {
        let classifier = Classifier::new(&small_config(), 4);
        let mut rng = StdRng::seed_from_u64(1);
        let err = classifier
            .predict_with_uncertainty(batch().view(), 1, &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn weights_round_trip_through_npz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("head.npz");

        let classifier = Classifier::new(&small_config(), 4);
        classifier.save_weights(&path).unwrap();

        // A differently-seeded head converges to the stored weights on load
        let mut other_config = small_config();
        other_config.extractor_seed = 100;
        let mut restored = Classifier::new(&other_config, 4);
        restored.load_weights(&path).unwrap();
        assert_eq!(restored.head.w1, classifier.head.w1);
        assert_eq!(restored.head.b3, classifier.head.b3);
    }

    #[test]
    fn mismatched_weights_are_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("head.npz");

        let classifier = Classifier::new(&small_config(), 4);
        classifier.save_weights(&path).unwrap();

        let mut wider = Classifier::new(&small_config(), 9);
        let err = wider.load_weights(&path).unwrap_err();
        assert!(matches!(err, Error::ModelArtifact(_)));
    }
}
