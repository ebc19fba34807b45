//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! training and prediction.

mod predictor;
mod training;

pub use predictor::{Predictor, PredictorConfig, INCONCLUSIVE_MESSAGE};
pub use training::{
    holdout_split, load_training_data, ModelAccuracies, Trainer, TrainingConfig, TrainingReport,
};
