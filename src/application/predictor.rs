//! Predictor facade: Ranked disease and medicine predictions for one query.
//!
//! A [`Predictor`] is produced by [`Trainer::train`](super::Trainer::train)
//! and is immutable afterwards. Every query path returns a
//! [`PredictionOutcome`]; bad input or an unseen category becomes a typed
//! failure instead of an error.

use serde::{Deserialize, Serialize};

use super::training::{
    env_value, load_training_data, ModelAccuracies, Trainer, TrainingConfig, TrainingReport,
};
use crate::adapters::boosting::GradientBoostingClassifier;
use crate::adapters::forest::RandomForestClassifier;
use crate::domain::{
    ensure_width, rank_diseases, rank_medicines, BestPrediction, FeatureEncoder, LabelProbability,
    PatientQuery, PredictionFailure, PredictionOutcome, QueryInput, RankedPrediction,
    RankingPolicy, TargetEncoder, DEFAULT_DISEASE_THRESHOLD, DEFAULT_TOP_K,
};
use crate::ports::{MultiLabelClassifier, RecordStore, SingleLabelClassifier};
use crate::Result;

/// Message of the best-of failure when either list is empty.
pub const INCONCLUSIVE_MESSAGE: &str = "Could not make predictions with sufficient confidence";

/// Ranking configuration for a predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Disease classes considered before thresholding
    pub disease_top_k: usize,

    /// Minimum disease probability (exclusive)
    pub disease_threshold: f64,

    /// Medicine selection policy
    pub medicine_policy: RankingPolicy,

    /// Maximum entries per returned list
    pub max_results: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            disease_top_k: DEFAULT_TOP_K,
            disease_threshold: DEFAULT_DISEASE_THRESHOLD,
            medicine_policy: RankingPolicy::default(),
            max_results: DEFAULT_TOP_K,
        }
    }
}

impl PredictorConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - MEDRECOMMEND_MEDICINE_POLICY="binary" | "threshold"
    /// - MEDRECOMMEND_DISEASE_THRESHOLD, in [0, 1)
    /// - MEDRECOMMEND_MEDICINE_THRESHOLD, in [0, 1) (threshold policy only)
    /// - MEDRECOMMEND_MAX_RESULTS
    #[must_use]
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Some(policy) = env_value::<RankingPolicy>("MEDRECOMMEND_MEDICINE_POLICY") {
            cfg.medicine_policy = policy;
        }

        if let Some(x) = env_value::<f64>("MEDRECOMMEND_DISEASE_THRESHOLD") {
            if (0.0..1.0).contains(&x) {
                cfg.disease_threshold = x;
            }
        }

        if let Some(x) = env_value::<f64>("MEDRECOMMEND_MEDICINE_THRESHOLD") {
            if let RankingPolicy::ThresholdGated { threshold } = &mut cfg.medicine_policy {
                if (0.0..1.0).contains(&x) {
                    *threshold = x;
                }
            }
        }

        if let Some(n) = env_value::<usize>("MEDRECOMMEND_MAX_RESULTS") {
            if n > 0 {
                cfg.max_results = n;
            }
        }

        cfg
    }
}

/// A trained disease and medicine predictor.
#[derive(Debug, Clone)]
pub struct Predictor<D = GradientBoostingClassifier, M = RandomForestClassifier> {
    features: FeatureEncoder,
    targets: TargetEncoder,
    disease_model: D,
    medicine_model: M,
    config: PredictorConfig,
    report: TrainingReport,
}

impl Predictor {
    /// Load the store and train once with the default model families.
    ///
    /// # Errors
    /// Returns `NoTrainingData` if the store is missing, empty or holds no
    /// usable record, or a model error if fitting fails.
    pub fn from_store<S: RecordStore>(
        store: &S,
        training: TrainingConfig,
        config: PredictorConfig,
    ) -> Result<Self> {
        let records = load_training_data(store);
        Ok(Trainer::new(training).train(&records)?.with_config(config))
    }
}

impl<D, M> Predictor<D, M>
where
    D: SingleLabelClassifier,
    M: MultiLabelClassifier,
{
    pub(crate) fn from_parts(
        features: FeatureEncoder,
        targets: TargetEncoder,
        disease_model: D,
        medicine_model: M,
        config: PredictorConfig,
        report: TrainingReport,
    ) -> Self {
        Self {
            features,
            targets,
            disease_model,
            medicine_model,
            config,
            report,
        }
    }

    /// Replace the ranking configuration.
    #[must_use]
    pub fn with_config(mut self, config: PredictorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    #[must_use]
    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Holdout accuracies as percentages.
    #[must_use]
    pub fn model_accuracies(&self) -> ModelAccuracies {
        self.report.model_accuracies()
    }

    #[must_use]
    pub fn feature_encoder(&self) -> &FeatureEncoder {
        &self.features
    }

    #[must_use]
    pub fn target_encoder(&self) -> &TargetEncoder {
        &self.targets
    }

    /// Ranked diseases and medicines for a validated query.
    pub fn predict(&self, query: &PatientQuery) -> PredictionOutcome<RankedPrediction> {
        let outcome: PredictionOutcome<_> = self.rank(query).into();
        if let Some(failure) = outcome.failure() {
            tracing::debug!("Prediction failed ({:?}): {}", failure.kind, failure.error);
        }
        outcome
    }

    /// Validate loosely-typed input, then predict.
    pub fn predict_input(&self, input: &QueryInput) -> PredictionOutcome<RankedPrediction> {
        match PatientQuery::try_from(input) {
            Ok(query) => self.predict(&query),
            Err(e) => PredictionOutcome::Failed(e.into()),
        }
    }

    /// Validate raw query fields, then predict.
    pub fn predict_parts(
        &self,
        age: i64,
        gender: &str,
        symptoms: &str,
        cause: &str,
    ) -> PredictionOutcome<RankedPrediction> {
        match PatientQuery::new(age, gender, symptoms, cause) {
            Ok(query) => self.predict(&query),
            Err(e) => PredictionOutcome::Failed(e.into()),
        }
    }

    /// Single most likely disease and medicine.
    ///
    /// Inconclusive unless both ranked lists are non-empty.
    pub fn predict_single(&self, query: &PatientQuery) -> PredictionOutcome<BestPrediction> {
        self.rank(query)
            .and_then(|ranked| match (ranked.disease, ranked.medicine) {
                (Some(disease), Some(medicine)) => Ok(BestPrediction { disease, medicine }),
                _ => Err(PredictionFailure::inconclusive(INCONCLUSIVE_MESSAGE)),
            })
            .into()
    }

    fn rank(
        &self,
        query: &PatientQuery,
    ) -> std::result::Result<RankedPrediction, PredictionFailure> {
        let row = self.features.transform(query.into())?;
        let row = row.view();
        ensure_width(row, self.disease_model.n_features())?;
        ensure_width(row, self.medicine_model.n_features())?;

        let disease_probabilities = self.disease_model.predict_proba(row);
        let mut diseases = rank_diseases(
            &disease_probabilities,
            self.targets.disease_vocabulary(),
            self.config.disease_top_k,
            self.config.disease_threshold,
        );

        let outputs: Vec<LabelProbability> = self
            .medicine_model
            .predict_proba(row)
            .into_iter()
            .zip(self.medicine_model.predict(row))
            .map(|(present, flagged)| LabelProbability { present, flagged })
            .collect();
        let mut medicines = rank_medicines(
            &outputs,
            self.targets.medicine_vocabulary(),
            self.config.medicine_policy,
        );

        diseases.truncate(self.config.max_results);
        medicines.truncate(self.config.max_results);

        tracing::debug!(
            "Ranked {} diseases and {} medicines",
            diseases.len(),
            medicines.len()
        );
        Ok(RankedPrediction::new(diseases, medicines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::json_store::JsonRecordStore;
    use crate::domain::{FailureKind, RankedLabel, RawRecord};
    use crate::PredictorError;
    use serde_json::json;

    fn quick_config() -> TrainingConfig {
        let mut cfg = TrainingConfig::default();
        cfg.boosting.n_estimators = 30;
        cfg.forest.n_estimators = 30;
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

    fn mixed_records() -> Vec<RawRecord> {
        let mut records = Vec::new();
        for i in 0..30 {
            records.push(json!({
                "Age": 35 + i % 10,
                "Gender": "M",
                "Symptoms": "Fever, Cough",
                "Causes": "Viral Infection",
                "Disease": "Flu",
                "Medicine": "Paracetamol, Rest"
            }));
            records.push(json!({
                "Age": 20 + i % 10,
                "Gender": "F",
                "Symptoms": "Nausea, Vomiting",
                "Causes": "Bacterial Infection",
                "Disease": "Food Poisoning",
                "Medicine": "ORS"
            }));
        }
        records
    }

    fn assert_sorted(labels: &[RankedLabel]) {
        for pair in labels.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_end_to_end_single_disease() {
        let predictor = Trainer::new(quick_config())
            .train(&vec![flu_record(); 50])
            .expect("Should train");

        let prediction = predictor
            .predict_parts(40, "M", "Fever, Cough", "Viral Infection")
            .into_result()
            .expect("Should predict");

        assert_eq!(prediction.diseases[0].name, "Flu");
        assert!((prediction.diseases[0].confidence - 100.0).abs() < 1e-9);
        assert!(prediction.medicines.iter().any(|m| m.name == "Paracetamol"));
        assert!(prediction.is_conclusive());
    }

    #[test]
    fn test_ranked_lists_are_bounded_and_sorted() {
        let predictor = Trainer::new(quick_config())
            .train(&mixed_records())
            .expect("Should train");

        let prediction = predictor
            .predict_parts(38, "m", "Fever, Cough", "Viral Infection")
            .into_result()
            .expect("Should predict");

        assert_eq!(prediction.diseases[0].name, "Flu");
        assert!(prediction.diseases.len() <= 5);
        assert!(prediction.medicines.len() <= 5);
        assert_sorted(&prediction.diseases);
        assert_sorted(&prediction.medicines);
        assert!(prediction.diseases.iter().all(|d| d.confidence > 20.0));
        assert!(prediction.diseases.iter().all(|d| (0.0..=100.0).contains(&d.confidence)));

        let names: Vec<&str> = prediction.medicines.iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"Paracetamol"));
        assert!(names.contains(&"Rest"));
        assert!(!names.contains(&"ORS"));
    }

    #[test]
    fn test_threshold_policy_reports_confident_absences() {
        let config = PredictorConfig {
            medicine_policy: RankingPolicy::threshold_gated(),
            ..PredictorConfig::default()
        };
        let predictor = Trainer::new(quick_config())
            .train(&mixed_records())
            .expect("Should train")
            .with_config(config);

        let prediction = predictor
            .predict_parts(38, "M", "Fever, Cough", "Viral Infection")
            .into_result()
            .expect("Should predict");

        // Confidence is the more likely class, so a confidently absent
        // medicine is reported as well.
        let names: Vec<&str> = prediction.medicines.iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"ORS"));
        assert!(prediction.medicines.iter().all(|m| m.confidence > 30.0));
        assert_sorted(&prediction.medicines);
    }

    #[test]
    fn test_max_results_truncates() {
        let config = PredictorConfig {
            max_results: 1,
            ..PredictorConfig::default()
        };
        let predictor = Trainer::new(quick_config())
            .train(&mixed_records())
            .expect("Should train")
            .with_config(config);

        let prediction = predictor
            .predict_parts(38, "M", "Fever, Cough", "Viral Infection")
            .into_result()
            .expect("Should predict");
        assert_eq!(prediction.diseases.len(), 1);
        assert_eq!(prediction.medicines.len(), 1);
    }

    #[test]
    fn test_invalid_age_fails() {
        let predictor = Trainer::new(quick_config())
            .train(&vec![flu_record(); 10])
            .expect("Should train");

        for age in [-5, 200] {
            let outcome = predictor.predict_parts(age, "M", "Fever", "Viral Infection");
            let failure = outcome.failure().expect("Should fail");
            assert_eq!(failure.kind, FailureKind::InvalidInput);
            assert!(!failure.error.is_empty());
        }
    }

    #[test]
    fn test_unknown_cause_fails() {
        let predictor = Trainer::new(quick_config())
            .train(&vec![flu_record(); 10])
            .expect("Should train");

        let outcome = predictor.predict_parts(40, "M", "Fever", "Radiation");
        assert_eq!(
            outcome.failure().map(|f| f.kind),
            Some(FailureKind::UnknownCategory)
        );

        let rendered = serde_json::to_value(&outcome).expect("Should serialize");
        assert_eq!(rendered["kind"], "unknown_category");
        assert!(rendered["error"].is_string());
    }

    #[test]
    fn test_unseen_symptoms_are_ignored() {
        let predictor = Trainer::new(quick_config())
            .train(&vec![flu_record(); 10])
            .expect("Should train");

        let outcome = predictor.predict_parts(40, "M", "Fever, Sneezing", "Viral Infection");
        assert!(outcome.is_ready());
    }

    #[test]
    fn test_predict_input() {
        let predictor = Trainer::new(quick_config())
            .train(&vec![flu_record(); 10])
            .expect("Should train");

        let input: QueryInput = serde_json::from_value(json!({
            "age": "40",
            "gender": "m",
            "symptoms": "Fever, Cough",
            "cause": "Viral Infection"
        }))
        .expect("Should parse");
        assert!(predictor.predict_input(&input).is_ready());

        let input: QueryInput = serde_json::from_value(json!({
            "age": 40,
            "gender": "X",
            "symptoms": "Fever",
            "cause": "Viral Infection"
        }))
        .expect("Should parse");
        assert_eq!(
            predictor.predict_input(&input).failure().map(|f| f.kind),
            Some(FailureKind::InvalidInput)
        );
    }

    #[test]
    fn test_predict_single() {
        let predictor = Trainer::new(quick_config())
            .train(&mixed_records())
            .expect("Should train");
        let query = PatientQuery::new(25, "F", "Nausea, Vomiting", "Bacterial Infection")
            .expect("Should validate");

        let best = predictor
            .predict_single(&query)
            .into_result()
            .expect("Should predict");
        assert_eq!(best.disease.name, "Food Poisoning");
        assert_eq!(best.medicine.name, "ORS");
    }

    #[test]
    fn test_predict_single_without_medicines_is_inconclusive() {
        let mut record = flu_record();
        record["Medicine"] = json!("");
        let predictor = Trainer::new(quick_config())
            .train(&vec![record; 10])
            .expect("Should train");
        let query = PatientQuery::new(40, "M", "Fever, Cough", "Viral Infection")
            .expect("Should validate");

        let ranked = predictor.predict(&query).into_result().expect("Should predict");
        assert!(ranked.medicines.is_empty());
        assert!(!ranked.is_conclusive());

        let failure = predictor
            .predict_single(&query)
            .into_result()
            .expect_err("Should be inconclusive");
        assert_eq!(failure.kind, FailureKind::Inconclusive);
        assert_eq!(failure.error, INCONCLUSIVE_MESSAGE);
    }

    #[test]
    fn test_from_store() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = JsonRecordStore::new(dir.path().join("output.json"));

        let missing = Predictor::from_store(&store, quick_config(), PredictorConfig::default());
        assert!(matches!(missing, Err(PredictorError::NoTrainingData)));

        std::fs::write(store.path(), "{}").expect("Should write");
        let empty = Predictor::from_store(&store, quick_config(), PredictorConfig::default());
        assert!(matches!(empty, Err(PredictorError::NoTrainingData)));

        store
            .append_records(&vec![flu_record(); 10])
            .expect("Should append");
        let config = PredictorConfig {
            max_results: 3,
            ..PredictorConfig::default()
        };
        let predictor =
            Predictor::from_store(&store, quick_config(), config).expect("Should train");
        assert_eq!(predictor.config().max_results, 3);
        assert_eq!(predictor.report().records_used, 10);
    }

    #[test]
    fn test_predictor_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Predictor>();
    }
}
