//! Head fine-tuning
//!
//! A lightweight incremental fine-tune, not a from-scratch regime: a fixed
//! small number of epochs, AdamW with a cosine-annealed learning rate,
//! shuffled mini-batches, no early stopping, no validation split.
//!
//! The extractor is frozen, so its features are computed once up front and
//! the epochs iterate over feature vectors only.

use super::classifier::Classifier;
use super::head::bce_with_logits;
use super::optimizer::{cosine_lr, AdamW};
use crate::config::TrainingConfig;
use crate::dataset::LabeledView;
use crate::{Error, Result};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Summary of one fine-tuning pass
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub examples: usize,
    pub epochs: usize,
    pub final_epoch_loss: f32,
}

/// Fine-tune the classifier head on the labeled view
pub fn fine_tune<R: Rng>(
    classifier: &mut Classifier,
    view: &LabeledView,
    config: &TrainingConfig,
    rng: &mut R,
) -> Result<TrainingReport> {
    if view.examples.is_empty() {
        return Err(Error::InvalidInput(
            "cannot fine-tune on an empty labeled view".to_string(),
        ));
    }

    let n = view.examples.len();
    let classes = classifier.num_classes();

    // Single frozen extractor pass over the whole view
    let mut features = Array2::zeros((n, classifier.extractor.out_features()));
    let mut targets = Array2::zeros((n, classes));
    for (i, example) in view.examples.iter().enumerate() {
        let image = example
            .features
            .view()
            .insert_axis(Axis(0));
        let extracted = classifier.extractor.extract(image)?;
        features
            .row_mut(i)
            .assign(&extracted.index_axis(Axis(0), 0));
        if example.target.len() != classes {
            return Err(Error::Config(format!(
                "target width {} does not match {} classes",
                example.target.len(),
                classes
            )));
        }
        targets.row_mut(i).assign(&example.target);
    }

    let mut optimizer = AdamW::new(&classifier.head, config.weight_decay);
    let mut indices: Vec<usize> = (0..n).collect();
    let batch_size = config.batch_size.max(1);
    let mut final_epoch_loss = 0.0;

    for epoch in 0..config.epochs {
        let lr = cosine_lr(config.learning_rate, epoch, config.epochs);
        indices.shuffle(rng);

        let mut epoch_loss = 0.0;
        for batch in indices.chunks(batch_size) {
            let x = features.select(Axis(0), batch);
            let y = targets.select(Axis(0), batch);

            let (logits, cache) = classifier.head.forward_train(x.view(), rng);
            let (loss, grad_logits) = bce_with_logits(logits.view(), y.view());
            let grads = classifier.head.backward(&cache, grad_logits.view());
            optimizer.step(&mut classifier.head, &grads, lr);

            epoch_loss += loss * batch.len() as f32;
        }

        final_epoch_loss = epoch_loss / n as f32;
        debug!(
            epoch = epoch + 1,
            epochs = config.epochs,
            lr,
            loss = final_epoch_loss,
            "fine-tune epoch complete"
        );
    }

    Ok(TrainingReport {
        examples: n,
        epochs: config.epochs,
        final_epoch_loss,
    })
}
