//! AdamW optimizer and cosine learning-rate schedule
//!
//! Decoupled weight decay (applied to the parameter, not the gradient
//! moments), bias-corrected first/second moments. One state pair per head
//! parameter tensor; biases are not decayed.

use super::head::{Head, HeadGradients};
use ndarray::{Array, Dimension};
use std::f32::consts::PI;

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPS: f32 = 1e-8;

struct Moments<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Moments<D> {
    fn like(param: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    fn update(
        &mut self,
        param: &mut Array<f32, D>,
        grad: &Array<f32, D>,
        lr: f32,
        weight_decay: f32,
        step: i32,
    ) {
        let bias1 = 1.0 - BETA1.powi(step);
        let bias2 = 1.0 - BETA2.powi(step);

        self.m.zip_mut_with(grad, |m, &g| *m = BETA1 * *m + (1.0 - BETA1) * g);
        self.v.zip_mut_with(grad, |v, &g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);

        ndarray::Zip::from(param)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *p -= lr * (m_hat / (v_hat.sqrt() + EPS) + weight_decay * *p);
            });
    }
}

/// AdamW over the six head parameter tensors
pub struct AdamW {
    weight_decay: f32,
    step: i32,
    w1: Moments<ndarray::Ix2>,
    b1: Moments<ndarray::Ix1>,
    w2: Moments<ndarray::Ix2>,
    b2: Moments<ndarray::Ix1>,
    w3: Moments<ndarray::Ix2>,
    b3: Moments<ndarray::Ix1>,
}

impl AdamW {
    pub fn new(head: &Head, weight_decay: f32) -> Self {
        Self {
            weight_decay,
            step: 0,
            w1: Moments::like(&head.w1),
            b1: Moments::like(&head.b1),
            w2: Moments::like(&head.w2),
            b2: Moments::like(&head.b2),
            w3: Moments::like(&head.w3),
            b3: Moments::like(&head.b3),
        }
    }

    /// Apply one update step at the given learning rate
    pub fn step(&mut self, head: &mut Head, grads: &HeadGradients, lr: f32) {
        self.step += 1;
        let t = self.step;
        let wd = self.weight_decay;
        self.w1.update(&mut head.w1, &grads.w1, lr, wd, t);
        self.b1.update(&mut head.b1, &grads.b1, lr, 0.0, t);
        self.w2.update(&mut head.w2, &grads.w2, lr, wd, t);
        self.b2.update(&mut head.b2, &grads.b2, lr, 0.0, t);
        self.w3.update(&mut head.w3, &grads.w3, lr, wd, t);
        self.b3.update(&mut head.b3, &grads.b3, lr, 0.0, t);
    }
}

/// Cosine annealing from `base` at epoch 0 towards 0 at `total` epochs
pub fn cosine_lr(base: f32, epoch: usize, total: usize) -> f32 {
    if total <= 1 {
        return base;
    }
    0.5 * base * (1.0 + (PI * epoch as f32 / total as f32).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn cosine_schedule_decays_monotonically() {
        let base = 2e-4;
        let lrs: Vec<f32> = (0..5).map(|e| cosine_lr(base, e, 5)).collect();
        assert_eq!(lrs[0], base);
        for pair in lrs.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert!(lrs[4] > 0.0);
    }

    #[test]
    fn adamw_steps_reduce_loss_on_fixed_batch() {
        use crate::model::head::{bce_with_logits, Head};

        let mut rng = StdRng::seed_from_u64(11);
        let mut head = Head::new(4, 8, 6, 2, 0.0, &mut rng);
        let mut opt = AdamW::new(&head, 0.0);

        let x = arr2(&[[0.5, -0.2, 0.8, 0.1], [-0.6, 0.9, 0.2, -0.4]]);
        let y = arr2(&[[1.0, 0.0], [0.0, 1.0]]);

        let (logits, _) = head.forward_train(x.view(), &mut rng);
        let (initial_loss, _) = bce_with_logits(logits.view(), y.view());

        for _ in 0..50 {
            let (logits, cache) = head.forward_train(x.view(), &mut rng);
            let (_, grad) = bce_with_logits(logits.view(), y.view());
            let grads = head.backward(&cache, grad.view());
            opt.step(&mut head, &grads, 1e-2);
        }

        let (logits, _) = head.forward_train(x.view(), &mut rng);
        let (final_loss, _) = bce_with_logits(logits.view(), y.view());
        assert!(
            final_loss < initial_loss * 0.5,
            "loss did not drop: {} -> {}",
            initial_loss,
            final_loss
        );
    }
}
