//! Frozen feature extractor
//!
//! Stand-in for a pretrained CNN backbone: adaptive average pooling of each
//! spectrogram channel to a fixed grid, then a frozen random linear
//! projection with ReLU. The weights derive from a fixed seed so extraction
//! is identical across process restarts: the persisted head was trained
//! against these features and must keep seeing the same ones.
//!
//! Parameters are never updated; there is no backward pass through this
//! module.

use crate::config::ModelConfig;
use crate::{Error, Result};
use ndarray::{Array1, Array2, ArrayView4, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct FeatureExtractor {
    grid: usize,
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl FeatureExtractor {
    pub fn new(config: &ModelConfig) -> Self {
        let grid = config.pool_grid;
        let in_dim = 3 * grid * grid;
        let mut rng = StdRng::seed_from_u64(config.extractor_seed);
        let bound = 1.0 / (in_dim as f32).sqrt();
        let weight =
            Array2::from_shape_fn((in_dim, config.feature_dim), |_| rng.gen_range(-bound..bound));
        let bias = Array1::from_shape_fn(config.feature_dim, |_| rng.gen_range(-bound..bound));
        Self { grid, weight, bias }
    }

    /// Width of the extracted feature vectors
    pub fn out_features(&self) -> usize {
        self.bias.len()
    }

    /// Single deterministic pass: (batch, 3, H, W) → (batch, feature_dim)
    pub fn extract(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let shape = batch.shape();
        if shape[1] != 3 {
            return Err(Error::InvalidInput(format!(
                "expected 3-channel input, got {} channels",
                shape[1]
            )));
        }
        if shape[2] == 0 || shape[3] == 0 {
            return Err(Error::InvalidInput("empty spectrogram image".to_string()));
        }

        let pooled = self.pool(batch);
        let mut features = pooled.dot(&self.weight) + &self.bias;
        features.mapv_inplace(|v| v.max(0.0));
        Ok(features)
    }

    /// Adaptive average pooling: each channel reduced to a grid×grid mean
    /// map, flattened to (batch, 3·grid²)
    fn pool(&self, batch: ArrayView4<'_, f32>) -> Array2<f32> {
        let (n, _, height, width) = batch.dim();
        let g = self.grid;
        let mut pooled = Array2::zeros((n, 3 * g * g));

        for (i, image) in batch.axis_iter(Axis(0)).enumerate() {
            for c in 0..3 {
                let channel = image.index_axis(Axis(0), c);
                for gy in 0..g {
                    let (y0, y1) = bin_bounds(gy, g, height);
                    for gx in 0..g {
                        let (x0, x1) = bin_bounds(gx, g, width);
                        let mut sum = 0.0;
                        for y in y0..y1 {
                            for x in x0..x1 {
                                sum += channel[[y, x]];
                            }
                        }
                        let count = ((y1 - y0) * (x1 - x0)) as f32;
                        pooled[[i, c * g * g + gy * g + gx]] = sum / count;
                    }
                }
            }
        }
        pooled
    }
}

/// Half-open bin bounds for adaptive pooling. For any extent ≥ 1 the bin is
/// non-empty and end never exceeds the extent.
fn bin_bounds(index: usize, bins: usize, extent: usize) -> (usize, usize) {
    let start = index * extent / bins;
    let end = ((index + 1) * extent).div_ceil(bins);
    (start, end)
}
