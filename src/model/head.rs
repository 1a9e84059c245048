//! Trainable classification head
//!
//! A three-layer feed-forward stack over the frozen extractor's features:
//! `Linear → ReLU → Dropout → Linear → ReLU → Dropout → Linear`, producing
//! one logit per class (multi-label; sigmoid is applied by the caller).
//!
//! Dropout is explicit per call: the deterministic [`Head::forward`] never
//! drops units, while [`Head::forward_stochastic`] and
//! [`Head::forward_train`] take the RNG that drives the masks. No mode state
//! is kept on the instance, so a stochastic scoring pass cannot leak into a
//! later deterministic prediction.
//!
//! Backpropagation is analytic; the head is small enough that an autograd
//! dependency buys nothing.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

pub struct Head {
    pub(crate) w1: Array2<f32>,
    pub(crate) b1: Array1<f32>,
    pub(crate) w2: Array2<f32>,
    pub(crate) b2: Array1<f32>,
    pub(crate) w3: Array2<f32>,
    pub(crate) b3: Array1<f32>,
    dropout: f32,
}

/// Intermediate activations kept for the backward pass
pub struct HeadCache {
    x: Array2<f32>,
    a1: Array2<f32>,
    d1: Option<Array2<f32>>,
    h1: Array2<f32>,
    a2: Array2<f32>,
    d2: Option<Array2<f32>>,
    h2: Array2<f32>,
}

/// Parameter gradients, same shapes as the parameters
pub struct HeadGradients {
    pub w1: Array2<f32>,
    pub b1: Array1<f32>,
    pub w2: Array2<f32>,
    pub b2: Array1<f32>,
    pub w3: Array2<f32>,
    pub b3: Array1<f32>,
}

impl Head {
    /// Fresh head with Kaiming-uniform initialization
    pub fn new<R: Rng>(
        in_features: usize,
        hidden1: usize,
        hidden2: usize,
        classes: usize,
        dropout: f32,
        rng: &mut R,
    ) -> Self {
        Self {
            w1: init_weight(in_features, hidden1, rng),
            b1: init_bias(in_features, hidden1, rng),
            w2: init_weight(hidden1, hidden2, rng),
            b2: init_bias(hidden1, hidden2, rng),
            w3: init_weight(hidden2, classes, rng),
            b3: init_bias(hidden2, classes, rng),
            dropout,
        }
    }

    pub fn in_features(&self) -> usize {
        self.w1.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.w3.ncols()
    }

    pub fn dropout(&self) -> f32 {
        self.dropout
    }

    /// Deterministic logits (dropout inactive)
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let h1 = relu(x.dot(&self.w1) + &self.b1);
        let h2 = relu(h1.dot(&self.w2) + &self.b2);
        h2.dot(&self.w3) + &self.b3
    }

    /// One stochastic pass with fresh dropout masks
    pub fn forward_stochastic<R: Rng>(&self, x: ArrayView2<'_, f32>, rng: &mut R) -> Array2<f32> {
        self.forward_train(x, rng).0
    }

    /// Stochastic pass that keeps the activations needed by [`Head::backward`]
    pub fn forward_train<R: Rng>(
        &self,
        x: ArrayView2<'_, f32>,
        rng: &mut R,
    ) -> (Array2<f32>, HeadCache) {
        let a1 = relu(x.dot(&self.w1) + &self.b1);
        let d1 = self.mask(a1.dim(), rng);
        let h1 = apply_mask(&a1, d1.as_ref());

        let a2 = relu(h1.dot(&self.w2) + &self.b2);
        let d2 = self.mask(a2.dim(), rng);
        let h2 = apply_mask(&a2, d2.as_ref());

        let logits = h2.dot(&self.w3) + &self.b3;
        let cache = HeadCache {
            x: x.to_owned(),
            a1,
            d1,
            h1,
            a2,
            d2,
            h2,
        };
        (logits, cache)
    }

    /// Analytic gradients given dLoss/dLogits
    pub fn backward(&self, cache: &HeadCache, grad_logits: ArrayView2<'_, f32>) -> HeadGradients {
        let gw3 = cache.h2.t().dot(&grad_logits);
        let gb3 = grad_logits.sum_axis(Axis(0));

        let dh2 = grad_logits.dot(&self.w3.t());
        let dz2 = backprop_layer(&dh2, &cache.a2, cache.d2.as_ref());
        let gw2 = cache.h1.t().dot(&dz2);
        let gb2 = dz2.sum_axis(Axis(0));

        let dh1 = dz2.dot(&self.w2.t());
        let dz1 = backprop_layer(&dh1, &cache.a1, cache.d1.as_ref());
        let gw1 = cache.x.t().dot(&dz1);
        let gb1 = dz1.sum_axis(Axis(0));

        HeadGradients {
            w1: gw1,
            b1: gb1,
            w2: gw2,
            b2: gb2,
            w3: gw3,
            b3: gb3,
        }
    }

    /// Inverted dropout mask (entries 0 or 1/(1−p)), or None when dropout is
    /// disabled
    fn mask<R: Rng>(&self, dim: (usize, usize), rng: &mut R) -> Option<Array2<f32>> {
        if self.dropout <= 0.0 {
            return None;
        }
        let keep = 1.0 - self.dropout;
        let scale = 1.0 / keep;
        Some(Array2::from_shape_fn(dim, |_| {
            if rng.gen::<f32>() < keep {
                scale
            } else {
                0.0
            }
        }))
    }
}

fn relu(mut z: Array2<f32>) -> Array2<f32> {
    z.mapv_inplace(|v| v.max(0.0));
    z
}

fn apply_mask(a: &Array2<f32>, mask: Option<&Array2<f32>>) -> Array2<f32> {
    match mask {
        Some(m) => a * m,
        None => a.clone(),
    }
}

/// Gradient through dropout and ReLU: dz = dh · mask · 1[pre-dropout
/// activation > 0]
fn backprop_layer(
    dh: &Array2<f32>,
    pre_dropout: &Array2<f32>,
    mask: Option<&Array2<f32>>,
) -> Array2<f32> {
    let mut dz = match mask {
        Some(m) => dh * m,
        None => dh.clone(),
    };
    dz.zip_mut_with(pre_dropout, |g, &a| {
        if a <= 0.0 {
            *g = 0.0;
        }
    });
    dz
}

/// Kaiming-uniform weight init, U(±1/√fan_in)
fn init_weight<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f32> {
    let bound = 1.0 / (fan_in as f32).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-bound..bound))
}

fn init_bias<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array1<f32> {
    let bound = 1.0 / (fan_in as f32).sqrt();
    Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound))
}

/// Binary cross-entropy with logits, averaged over batch and classes.
/// Returns (loss, dLoss/dLogits). Stable formulation:
/// `max(z,0) − z·y + ln(1 + e^{−|z|})`.
pub fn bce_with_logits(
    logits: ArrayView2<'_, f32>,
    targets: ArrayView2<'_, f32>,
) -> (f32, Array2<f32>) {
    let count = logits.len() as f32;
    let mut loss = 0.0;
    let mut grad = Array2::zeros(logits.raw_dim());
    for ((idx, &z), &y) in logits.indexed_iter().zip(targets.iter()) {
        loss += z.max(0.0) - z * y + (1.0 + (-z.abs()).exp()).ln();
        grad[idx] = (sigmoid(z) - y) / count;
    }
    (loss / count, grad)
}

pub fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}
