//! # medrecommend
//!
//! Disease and medicine recommendation from patient attributes.
//!
//! This crate provides:
//! - Normalization of loosely-typed patient records from a JSON store
//! - Deterministic feature encoding over fitted vocabularies
//! - A gradient-boosted disease classifier and a random-forest medicine classifier
//! - Confidence-ranked decoding of predictions into labels
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (records, queries, encoders, ranked predictions)
//! - `ports`: Trait definitions for classifiers and the record store
//! - `adapters`: Concrete implementations (tree ensembles, JSON store, ingestion)
//! - `application`: Training and prediction use cases

pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub use application::{Predictor, PredictorConfig, Trainer, TrainingConfig, TrainingReport};
pub use domain::{PatientQuery, PatientRecord, PredictionOutcome, RankedLabel, RankingPolicy};

/// Result type for medrecommend operations
pub type Result<T> = std::result::Result<T, PredictorError>;

/// Main error type for medrecommend
#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("No valid training data after cleaning")]
    NoTrainingData,

    #[error("Invalid query: {0}")]
    Query(#[from] domain::QueryError),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] domain::EncodingError),

    #[error("Model training failed: {0}")]
    Model(#[from] ports::ModelError),

    #[error("Record store operation failed: {0}")]
    Store(#[from] adapters::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::json_store::JsonRecordStore;
    use crate::adapters::StoreError;
    use crate::ports::RecordStore;

    #[test]
    fn test_store_io_failure_maps_to_store_error() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = JsonRecordStore::new(dir.path());

        let err: PredictorError = store
            .load_records()
            .expect_err("Should fail on a directory")
            .into();
        assert!(matches!(err, PredictorError::Store(StoreError::Io(_))));
    }
}
