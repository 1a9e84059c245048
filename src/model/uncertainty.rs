//! BALD uncertainty estimation over stochastic forward passes
//!
//! Input: per-pass sigmoid probabilities of shape (passes, batch, classes).
//! Output per batch element:
//! - predictive entropy: entropy of the pass-averaged prediction (total
//!   uncertainty)
//! - expected entropy: mean per-pass entropy (aleatoric)
//! - mutual information: predictive − expected (epistemic; the score
//!   persisted per segment)
//!
//! The ε guard inside the logarithm can push mutual information slightly
//! below zero near the noise floor; callers tolerate or clamp.

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};

/// Guard against log(0)
pub const LOG_EPS: f32 = 1e-8;

/// Per-input uncertainty scores derived from multi-pass predictions
#[derive(Debug, Clone)]
pub struct UncertaintyEstimate {
    /// Mean probability per class across passes, shape (batch, classes)
    pub mean_probs: Array2<f32>,
    /// Total uncertainty per input, shape (batch,)
    pub predictive_entropy: Array1<f32>,
    /// Aleatoric component per input, shape (batch,)
    pub expected_entropy: Array1<f32>,
    /// Epistemic component per input, shape (batch,)
    pub mutual_information: Array1<f32>,
}

/// Compute all scores from a (passes, batch, classes) probability tensor.
/// With a single pass the two entropy terms coincide and mutual information
/// is exactly zero.
pub fn estimate(probs: &Array3<f32>) -> UncertaintyEstimate {
    let (passes, batch, classes) = probs.dim();
    if passes == 0 {
        return UncertaintyEstimate {
            mean_probs: Array2::zeros((batch, classes)),
            predictive_entropy: Array1::zeros(batch),
            expected_entropy: Array1::zeros(batch),
            mutual_information: Array1::zeros(batch),
        };
    }

    let mut mean_probs = Array2::zeros((batch, classes));
    for pass in probs.axis_iter(Axis(0)) {
        mean_probs += &pass;
    }
    mean_probs /= passes as f32;

    let predictive_entropy = entropy_rows(mean_probs.view());

    let mut expected_entropy = Array1::zeros(batch);
    for pass in probs.axis_iter(Axis(0)) {
        expected_entropy += &entropy_rows(pass);
    }
    expected_entropy /= passes as f32;

    let mutual_information = &predictive_entropy - &expected_entropy;

    UncertaintyEstimate {
        mean_probs,
        predictive_entropy,
        expected_entropy,
        mutual_information,
    }
}

/// Row-wise entropy: −Σ_c p_c · ln(p_c + ε)
fn entropy_rows(probs: ArrayView2<'_, f32>) -> Array1<f32> {
    probs
        .rows()
        .into_iter()
        .map(|row| -row.iter().map(|&p| p * (p + LOG_EPS).ln()).sum::<f32>())
        .collect()
}
