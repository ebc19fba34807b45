//! Domain layer: Core business types and logic.
//!
//! This module contains pure Rust types with no I/O.
//! Records, queries, encoders and ranked predictions live here.

pub mod encoding;
pub mod prediction;
pub mod query;
pub mod record;

pub use encoding::{
    ensure_width, EncodingError, FeatureEncoder, FeatureInput, FeatureMatrix, LabelEncoder,
    LabelMatrix, MultiHotEncoder, TargetEncoder, Vocabulary,
};
pub use prediction::{
    best_of, rank_diseases, rank_medicines, to_percentage, BestPrediction, FailureKind,
    LabelProbability, PredictionFailure, PredictionOutcome, RankedLabel, RankedPrediction,
    RankingPolicy, DEFAULT_DISEASE_THRESHOLD, DEFAULT_MEDICINE_THRESHOLD, DEFAULT_TOP_K,
};
pub use query::{PatientQuery, QueryError, QueryInput};
pub use record::{
    normalize_records, safe_split, NormalizedBatch, PatientRecord, RawRecord, RecordOutcome,
    RejectReason, RejectedRecord,
};
