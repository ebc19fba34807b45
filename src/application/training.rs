//! Training service: Builds a [`Predictor`] from raw store records.
//!
//! This service coordinates:
//! - Record normalization
//! - Feature and target encoder fitting
//! - Holdout split and model fitting
//! - Accuracy and provenance reporting

use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ndarray::Axis;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::predictor::{Predictor, PredictorConfig};
use crate::adapters::boosting::{BoostingConfig, GradientBoostingTrainer};
use crate::adapters::forest::{ForestConfig, RandomForestTrainer};
use crate::domain::{
    normalize_records, to_percentage, FeatureEncoder, PatientRecord, RawRecord, TargetEncoder,
};
use crate::ports::{
    MultiLabelClassifier, MultiLabelTrainer, RecordStore, SingleLabelClassifier,
    SingleLabelTrainer,
};
use crate::{PredictorError, Result};

/// Read an environment variable and parse it, ignoring unset or invalid values.
pub(crate) fn env_value<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Training configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seed for the holdout shuffle
    pub seed: u64,

    /// Fraction of records held out for accuracy reporting
    pub test_fraction: f64,

    /// Disease model hyper-parameters
    pub boosting: BoostingConfig,

    /// Medicine model hyper-parameters
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            boosting: BoostingConfig::default(),
            forest: ForestConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - MEDRECOMMEND_SEED (holdout shuffle and both models)
    /// - MEDRECOMMEND_TEST_FRACTION, strictly between 0 and 1
    /// - MEDRECOMMEND_N_ESTIMATORS (boosting stages and forest trees)
    #[must_use]
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Some(seed) = env_value::<u64>("MEDRECOMMEND_SEED") {
            cfg.seed = seed;
            cfg.boosting.seed = seed;
            cfg.forest.seed = seed;
        }

        if let Some(x) = env_value::<f64>("MEDRECOMMEND_TEST_FRACTION") {
            if x.is_finite() && x > 0.0 && x < 1.0 {
                cfg.test_fraction = x;
            }
        }

        if let Some(n) = env_value::<usize>("MEDRECOMMEND_N_ESTIMATORS") {
            if n > 0 {
                cfg.boosting.n_estimators = n;
                cfg.forest.n_estimators = n;
            }
        }

        cfg
    }
}

/// Holdout accuracies as percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracies {
    pub disease_model: Option<f64>,
    pub medicine_model: Option<f64>,
}

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Raw records handed to the trainer
    pub records_seen: usize,

    /// Records that survived normalization
    pub records_used: usize,

    /// Records rejected during normalization
    pub records_rejected: usize,

    pub train_size: usize,
    pub test_size: usize,

    /// Encoded feature width
    pub n_features: usize,

    pub n_diseases: usize,
    pub n_medicines: usize,

    /// Holdout argmax accuracy of the disease model (fraction)
    pub disease_accuracy: Option<f64>,

    /// Holdout exact-match accuracy of the medicine model (fraction)
    pub medicine_accuracy: Option<f64>,

    /// SHA-256 of the accepted records
    pub data_fingerprint: String,

    pub trained_at: DateTime<Utc>,
}

impl TrainingReport {
    /// Accuracies as percentages rounded to 2 decimals.
    #[must_use]
    pub fn model_accuracies(&self) -> ModelAccuracies {
        ModelAccuracies {
            disease_model: self.disease_accuracy.map(to_percentage),
            medicine_model: self.medicine_accuracy.map(to_percentage),
        }
    }
}

/// Load training records from a store.
///
/// Never fails: a missing, malformed or empty store yields an empty list
/// and a logged diagnostic.
pub fn load_training_data<S: RecordStore>(store: &S) -> Vec<RawRecord> {
    match store.load_records() {
        Ok(records) if records.is_empty() => {
            tracing::warn!("No training data found in record store");
            Vec::new()
        }
        Ok(records) => {
            tracing::info!("Loaded {} training records", records.len());
            records
        }
        Err(e) => {
            tracing::warn!("Failed to load training data: {}", e);
            Vec::new()
        }
    }
}

/// Shuffle `0..n` with `seed` and split off `ceil(test_fraction * n)` indices.
///
/// Returns `(train, test)`, or `None` when either side would be empty.
#[must_use]
pub fn holdout_split(n: usize, test_fraction: f64, seed: u64) -> Option<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction.is_finite() && test_fraction > 0.0) {
        return None;
    }
    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return None;
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Some((train, indices))
}

fn fingerprint(records: &[PatientRecord]) -> Result<String> {
    let bytes = serde_json::to_vec(records)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn select(labels: &[usize], indices: &[usize]) -> Vec<usize> {
    indices.iter().map(|&i| labels[i]).collect()
}

fn fraction(hits: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| hits as f64 / total as f64)
}

/// Trains a predictor from raw records.
///
/// The disease and medicine trainers default to gradient boosting and a
/// random forest.
#[derive(Debug, Clone)]
pub struct Trainer<DT = GradientBoostingTrainer, MT = RandomForestTrainer> {
    config: TrainingConfig,
    disease_trainer: DT,
    medicine_trainer: MT,
}

impl Trainer {
    /// Create a trainer with the default model families.
    #[must_use]
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            disease_trainer: GradientBoostingTrainer::new(config.boosting),
            medicine_trainer: RandomForestTrainer::new(config.forest),
            config,
        }
    }
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl<DT, MT> Trainer<DT, MT>
where
    DT: SingleLabelTrainer,
    MT: MultiLabelTrainer,
{
    /// Create a trainer with custom model trainers.
    pub fn with_trainers(
        config: TrainingConfig,
        disease_trainer: DT,
        medicine_trainer: MT,
    ) -> Self {
        Self {
            config,
            disease_trainer,
            medicine_trainer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train a predictor on raw records.
    ///
    /// Performs the full pipeline:
    /// 1. Normalize records, dropping invalid ones
    /// 2. Fit encoders on every accepted record
    /// 3. Fit both models on the training split
    /// 4. Score both models on the holdout split
    ///
    /// # Errors
    /// Returns `NoTrainingData` if no record survives normalization, an
    /// encoding error if a record cannot be encoded, or a model error if
    /// fitting fails.
    pub fn train(&self, raw: &[RawRecord]) -> Result<Predictor<DT::Model, MT::Model>> {
        let started = Instant::now();
        tracing::info!("Starting training on {} raw records...", raw.len());

        // Step 1: Normalize
        let batch = normalize_records(raw);
        if batch.is_empty() {
            tracing::warn!(
                "No valid training data after cleaning ({} records rejected)",
                batch.rejected.len()
            );
            return Err(PredictorError::NoTrainingData);
        }
        let records = &batch.accepted;

        // Step 2: Encode
        tracing::debug!("Step 2: Fitting encoders on {} records...", records.len());
        let (features, rows) = FeatureEncoder::fit_transform(records)?;
        let targets = TargetEncoder::fit(records);
        let disease_labels = targets.disease_labels(records)?;
        let medicine_labels = targets.medicine_labels(records);
        tracing::debug!(
            "Encoded {} features, {} diseases, {} medicines",
            features.width(),
            targets.n_diseases(),
            targets.n_medicines()
        );

        // Step 3: Fit
        let (train_idx, test_idx) =
            match holdout_split(records.len(), self.config.test_fraction, self.config.seed) {
                Some(split) => split,
                None => {
                    tracing::warn!(
                        "Too few records ({}) for a holdout split, fitting on all of them",
                        records.len()
                    );
                    ((0..records.len()).collect(), Vec::new())
                }
            };

        let train_rows = rows.select(Axis(0), &train_idx);
        tracing::debug!("Step 3: Fitting disease model...");
        let disease_model = self.disease_trainer.fit(
            &train_rows,
            &select(&disease_labels, &train_idx),
            targets.n_diseases(),
        )?;
        tracing::debug!("Step 3: Fitting medicine model...");
        let medicine_model = self
            .medicine_trainer
            .fit(&train_rows, &medicine_labels.select(Axis(0), &train_idx))?;

        // Step 4: Score
        let disease_hits = test_idx
            .iter()
            .filter(|&&i| disease_model.predict(rows.row(i)) == disease_labels[i])
            .count();
        let medicine_hits = test_idx
            .iter()
            .filter(|&&i| {
                let predicted = medicine_model.predict(rows.row(i));
                predicted.iter().eq(medicine_labels.row(i).iter())
            })
            .count();

        let report = TrainingReport {
            records_seen: raw.len(),
            records_used: records.len(),
            records_rejected: batch.rejected.len(),
            train_size: train_idx.len(),
            test_size: test_idx.len(),
            n_features: features.width(),
            n_diseases: targets.n_diseases(),
            n_medicines: targets.n_medicines(),
            disease_accuracy: fraction(disease_hits, test_idx.len()),
            medicine_accuracy: fraction(medicine_hits, test_idx.len()),
            data_fingerprint: fingerprint(records)?,
            trained_at: Utc::now(),
        };

        let accuracies = report.model_accuracies();
        tracing::info!(
            "Training complete in {:.2?}: disease accuracy={:?}%, medicine accuracy={:?}%",
            started.elapsed(),
            accuracies.disease_model,
            accuracies.medicine_model
        );

        Ok(Predictor::from_parts(
            features,
            targets,
            disease_model,
            medicine_model,
            PredictorConfig::default(),
            report,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::json_store::JsonRecordStore;
    use serde_json::json;

    fn quick_config() -> TrainingConfig {
        let mut cfg = TrainingConfig::default();
        cfg.boosting.n_estimators = 20;
        cfg.forest.n_estimators = 20;
        cfg
    }

    fn flu_record() -> RawRecord {
        json!({
            "Age": 40,
            "Gender": "M",
            "Symptoms": "Fever, Cough",
            "Causes": "Viral Infection",
            "Disease": "Flu",
            "Medicine": "Paracetamol"
        })
    }

    #[test]
    fn test_holdout_split_sizes() {
        let (train, test) = holdout_split(50, 0.2, 42).expect("Should split");
        assert_eq!(train.len(), 40);
        assert_eq!(test.len(), 10);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());

        // ceil(0.2 * 7) = 2
        let (_, test) = holdout_split(7, 0.2, 42).expect("Should split");
        assert_eq!(test.len(), 2);
    }

    #[test]
    fn test_holdout_split_is_seeded() {
        assert_eq!(holdout_split(30, 0.2, 7), holdout_split(30, 0.2, 7));
    }

    #[test]
    fn test_holdout_split_too_small() {
        assert!(holdout_split(0, 0.2, 42).is_none());
        assert!(holdout_split(1, 0.2, 42).is_none());
        assert!(holdout_split(10, 0.0, 42).is_none());
        assert!(holdout_split(2, 0.2, 42).is_some());
    }

    #[test]
    fn test_loader_tolerates_missing_and_empty_store() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("output.json");
        let store = JsonRecordStore::new(&path);
        assert!(load_training_data(&store).is_empty());

        std::fs::write(&path, "{}").expect("Should write");
        assert!(load_training_data(&store).is_empty());

        std::fs::write(&path, "garbage").expect("Should write");
        assert!(load_training_data(&store).is_empty());

        std::fs::write(&path, r#"{"records": [{"Disease": "Flu", "Symptoms": "Fever"}]}"#)
            .expect("Should write");
        assert_eq!(load_training_data(&store).len(), 1);
    }

    #[test]
    fn test_no_training_data() {
        let trainer = Trainer::new(quick_config());
        assert!(matches!(trainer.train(&[]), Err(PredictorError::NoTrainingData)));

        let unusable = vec![json!({"Disease": "Flu"}), json!({"Symptoms": "Fever"}), json!(3)];
        assert!(matches!(trainer.train(&unusable), Err(PredictorError::NoTrainingData)));
    }

    #[test]
    fn test_report() {
        let mut raw = vec![flu_record(); 20];
        raw.push(json!({"Age": "abc", "Disease": "Flu", "Symptoms": "Fever"}));

        let predictor = Trainer::new(quick_config()).train(&raw).expect("Should train");
        let report = predictor.report();

        assert_eq!(report.records_seen, 21);
        assert_eq!(report.records_used, 20);
        assert_eq!(report.records_rejected, 1);
        assert_eq!(report.train_size, 16);
        assert_eq!(report.test_size, 4);
        assert_eq!(report.n_features, 5);
        assert_eq!(report.n_diseases, 1);
        assert_eq!(report.n_medicines, 1);
        assert_eq!(report.data_fingerprint.len(), 64);

        let accuracies = report.model_accuracies();
        assert_eq!(accuracies.disease_model, Some(100.0));
        assert_eq!(accuracies.medicine_model, Some(100.0));
    }

    #[test]
    fn test_single_record_has_no_accuracy() {
        let predictor = Trainer::new(quick_config())
            .train(&[flu_record()])
            .expect("Should train");

        assert_eq!(predictor.report().train_size, 1);
        assert_eq!(predictor.report().test_size, 0);
        assert_eq!(predictor.model_accuracies().disease_model, None);
        assert_eq!(predictor.model_accuracies().medicine_model, None);
    }

    #[test]
    fn test_fingerprint_tracks_data() {
        let trainer = Trainer::new(quick_config());
        let a = trainer.train(&vec![flu_record(); 5]).expect("Should train");
        let b = trainer.train(&vec![flu_record(); 5]).expect("Should train");
        let c = trainer.train(&vec![flu_record(); 6]).expect("Should train");

        assert_eq!(a.report().data_fingerprint, b.report().data_fingerprint);
        assert_ne!(a.report().data_fingerprint, c.report().data_fingerprint);
    }
}
