//! Multi-label bird-call classifier
//!
//! A frozen feature extractor followed by a trainable feed-forward head.
//! Only the head learns; its weights are the sole persisted model artifact.
//! Stochastic (MC-dropout) inference is an explicit parameter of the forward
//! call, never a mode flag flipped on the instance.

pub mod classifier;
pub mod extractor;
pub mod head;
pub mod optimizer;
pub mod training;
pub mod uncertainty;

pub use classifier::Classifier;
pub use training::{fine_tune, TrainingReport};
pub use uncertainty::UncertaintyEstimate;
