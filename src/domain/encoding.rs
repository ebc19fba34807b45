//! Categorical encoders and feature-vector construction.
//!
//! All vocabularies are sorted and closed at fit time. The feature vector
//! layout is fixed:
//!
//! ```text
//! [ age | gender | symptom_0 .. symptom_{N-1} | cause_index ]
//! ```

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::query::PatientQuery;
use super::record::PatientRecord;

/// Dense feature matrix, one row per sample.
pub type FeatureMatrix = Array2<f64>;

/// Multi-label indicator matrix, one row per sample.
pub type LabelMatrix = Array2<bool>;

/// Columns before the symptom block (age, gender).
const LEADING_COLUMNS: usize = 2;

/// Errors raised while encoding records or queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("Unknown cause: {0:?} was not seen during training")]
    UnknownCause(String),

    #[error("Unknown label: {0:?} was not seen during training")]
    UnknownLabel(String),

    #[error("Feature width mismatch: model expects {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
}

/// Closed, sorted set of category values observed at fit time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    /// Collect the distinct values, sorted.
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels: BTreeSet<String> = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect();
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .ok()
    }

    #[must_use]
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Fixed-width indicator encoding of token sets.
///
/// Tokens outside the vocabulary are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiHotEncoder {
    vocabulary: Vocabulary,
}

impl MultiHotEncoder {
    pub fn fit<'a, I>(token_sets: I) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        Self {
            vocabulary: Vocabulary::fit(token_sets.into_iter().flatten()),
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.vocabulary.len()
    }

    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Indicator flags over the vocabulary.
    #[must_use]
    pub fn indicators(&self, tokens: &[String]) -> Vec<bool> {
        let mut flags = vec![false; self.width()];
        for token in tokens {
            if let Some(idx) = self.vocabulary.index_of(token) {
                flags[idx] = true;
            }
        }
        flags
    }

    /// Append the indicator columns for `tokens` to `row`.
    pub fn encode_into(&self, tokens: &[String], row: &mut Vec<f64>) {
        row.extend(
            self.indicators(tokens)
                .into_iter()
                .map(|present| if present { 1.0 } else { 0.0 }),
        );
    }
}

/// Single-valued categorical encoding to an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    vocabulary: Vocabulary,
}

impl LabelEncoder {
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            vocabulary: Vocabulary::fit(values),
        }
    }

    #[must_use]
    pub fn encode(&self, value: &str) -> Option<usize> {
        self.vocabulary.index_of(value)
    }

    #[must_use]
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.vocabulary.label(index)
    }

    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

/// The fields the feature encoder reads, shared by records and queries.
#[derive(Debug, Clone, Copy)]
pub struct FeatureInput<'a> {
    pub age: u32,
    pub is_male: bool,
    pub symptoms: &'a [String],
    pub cause: &'a str,
}

impl<'a> From<&'a PatientRecord> for FeatureInput<'a> {
    fn from(record: &'a PatientRecord) -> Self {
        Self {
            age: record.age,
            is_male: record.is_male(),
            symptoms: &record.symptoms,
            cause: &record.cause,
        }
    }
}

impl<'a> From<&'a PatientQuery> for FeatureInput<'a> {
    fn from(query: &'a PatientQuery) -> Self {
        Self {
            age: query.age(),
            is_male: query.is_male(),
            symptoms: query.symptoms(),
            cause: query.cause(),
        }
    }
}

/// Fitted encoder for the model input features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    symptoms: MultiHotEncoder,
    causes: LabelEncoder,
}

impl FeatureEncoder {
    /// Learn the symptom and cause vocabularies from training records.
    #[must_use]
    pub fn fit(records: &[PatientRecord]) -> Self {
        Self {
            symptoms: MultiHotEncoder::fit(records.iter().map(|r| r.symptoms.as_slice())),
            causes: LabelEncoder::fit(records.iter().map(|r| r.cause.as_str())),
        }
    }

    /// Fit on `records` and encode them in one pass.
    ///
    /// # Errors
    /// Never fails for the fitting records; the `Result` comes from
    /// [`transform_batch`](Self::transform_batch).
    pub fn fit_transform(
        records: &[PatientRecord],
    ) -> Result<(Self, FeatureMatrix), EncodingError> {
        let encoder = Self::fit(records);
        let matrix = encoder.transform_batch(records)?;
        Ok((encoder, matrix))
    }

    /// Encode a batch of records, one row each.
    ///
    /// # Errors
    /// Returns `EncodingError::UnknownCause` for the first record whose cause
    /// was not seen at fit time.
    pub fn transform_batch(
        &self,
        records: &[PatientRecord],
    ) -> Result<FeatureMatrix, EncodingError> {
        let mut matrix = Array2::zeros((records.len(), self.width()));
        for (mut out, record) in matrix.rows_mut().into_iter().zip(records) {
            out.assign(&self.transform(FeatureInput::from(record))?);
        }
        Ok(matrix)
    }

    /// Encode a single input.
    ///
    /// # Errors
    /// Returns `EncodingError::UnknownCause` if the cause was not seen at fit time.
    pub fn transform(&self, input: FeatureInput<'_>) -> Result<Array1<f64>, EncodingError> {
        let cause = self
            .causes
            .encode(input.cause)
            .ok_or_else(|| EncodingError::UnknownCause(input.cause.to_string()))?;

        let mut row = Vec::with_capacity(self.width());
        row.push(f64::from(input.age));
        row.push(if input.is_male { 1.0 } else { 0.0 });
        self.symptoms.encode_into(input.symptoms, &mut row);
        row.push(cause as f64);

        Ok(Array1::from(row))
    }

    /// Total feature vector width.
    #[must_use]
    pub fn width(&self) -> usize {
        LEADING_COLUMNS + self.symptoms.width() + 1
    }

    #[must_use]
    pub fn symptom_vocabulary(&self) -> &Vocabulary {
        self.symptoms.vocabulary()
    }

    #[must_use]
    pub fn cause_vocabulary(&self) -> &Vocabulary {
        self.causes.vocabulary()
    }

    /// Human-readable column names in feature order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec!["age".to_string(), "gender".to_string()];
        names.extend(
            self.symptoms
                .vocabulary()
                .labels()
                .iter()
                .map(|s| format!("symptom:{s}")),
        );
        names.push("cause".to_string());
        names
    }
}

/// Check that a feature row matches the width a model was trained on.
///
/// # Errors
/// Returns `EncodingError::WidthMismatch` when the widths differ.
pub fn ensure_width(row: ArrayView1<'_, f64>, expected: usize) -> Result<(), EncodingError> {
    if row.len() == expected {
        Ok(())
    } else {
        Err(EncodingError::WidthMismatch {
            expected,
            actual: row.len(),
        })
    }
}

/// Fitted encoder for the disease and medicine targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEncoder {
    diseases: LabelEncoder,
    medicines: MultiHotEncoder,
}

impl TargetEncoder {
    #[must_use]
    pub fn fit(records: &[PatientRecord]) -> Self {
        Self {
            diseases: LabelEncoder::fit(records.iter().map(|r| r.disease.as_str())),
            medicines: MultiHotEncoder::fit(records.iter().map(|r| r.medicines.as_slice())),
        }
    }

    /// Disease class index per record.
    ///
    /// # Errors
    /// Returns `EncodingError::UnknownLabel` for the first disease not seen
    /// at fit time.
    pub fn disease_labels(&self, records: &[PatientRecord]) -> Result<Vec<usize>, EncodingError> {
        records
            .iter()
            .map(|r| {
                self.diseases
                    .encode(&r.disease)
                    .ok_or_else(|| EncodingError::UnknownLabel(r.disease.clone()))
            })
            .collect()
    }

    /// Medicine indicator row per record; unseen medicines are ignored.
    #[must_use]
    pub fn medicine_labels(&self, records: &[PatientRecord]) -> LabelMatrix {
        let mut labels = Array2::from_elem((records.len(), self.n_medicines()), false);
        for (mut out, record) in labels.rows_mut().into_iter().zip(records) {
            let flags = self.medicines.indicators(&record.medicines);
            for (slot, present) in out.iter_mut().zip(flags) {
                *slot = present;
            }
        }
        labels
    }

    #[must_use]
    pub fn disease_vocabulary(&self) -> &Vocabulary {
        self.diseases.vocabulary()
    }

    #[must_use]
    pub fn medicine_vocabulary(&self) -> &Vocabulary {
        self.medicines.vocabulary()
    }

    #[must_use]
    pub fn n_diseases(&self) -> usize {
        self.diseases.vocabulary().len()
    }

    #[must_use]
    pub fn n_medicines(&self) -> usize {
        self.medicines.width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn record(
        age: u32,
        gender: &str,
        symptoms: &[&str],
        cause: &str,
        disease: &str,
        medicines: &[&str],
    ) -> PatientRecord {
        PatientRecord {
            age,
            gender: gender.to_string(),
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            cause: cause.to_string(),
            disease: disease.to_string(),
            medicines: medicines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn training_set() -> Vec<PatientRecord> {
        vec![
            record(40, "M", &["Fever", "Cough"], "Viral Infection", "Flu", &["Paracetamol"]),
            record(25, "F", &["Rash"], "Allergy", "Dermatitis", &["Cetirizine", "Hydrocortisone"]),
            record(60, "MALE", &["Chest Pain", "Cough"], "Smoking", "Bronchitis", &[]),
        ]
    }

    #[test]
    fn test_vocabulary_sorted_and_closed() {
        let vocab = Vocabulary::fit(["b", "a", "c", "a"]);
        assert_eq!(vocab.labels(), ["a", "b", "c"]);
        assert_eq!(vocab.index_of("c"), Some(2));
        assert_eq!(vocab.index_of("z"), None);
        assert_eq!(vocab.label(1), Some("b"));
        assert_eq!(vocab.label(9), None);
    }

    #[test]
    fn test_feature_layout() {
        let records = training_set();
        let (encoder, matrix) = FeatureEncoder::fit_transform(&records).expect("Should encode");

        // symptoms: Chest Pain, Cough, Fever, Rash
        assert_eq!(encoder.width(), 2 + 4 + 1);
        assert_eq!(
            matrix,
            array![
                [40.0, 1.0, 0.0, 1.0, 1.0, 0.0, 2.0],
                [25.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                [60.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0],
            ]
        );
        assert_eq!(encoder.feature_names().len(), encoder.width());
    }

    #[test]
    fn test_transform_ignores_unseen_symptoms() {
        let encoder = FeatureEncoder::fit(&training_set());
        let query =
            PatientQuery::new(33, "F", "Fever, Sneezing", "Allergy").expect("Should validate");

        let row = encoder.transform(FeatureInput::from(&query)).expect("Should encode");
        assert_eq!(row.len(), encoder.width());
        assert_eq!(row, array![33.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_transform_rejects_unknown_cause() {
        let encoder = FeatureEncoder::fit(&training_set());
        let query = PatientQuery::new(33, "F", "Fever", "Bacteria").expect("Should validate");

        assert_eq!(
            encoder.transform(FeatureInput::from(&query)),
            Err(EncodingError::UnknownCause("Bacteria".to_string()))
        );
    }

    #[test]
    fn test_batch_with_unknown_cause_fails() {
        let encoder = FeatureEncoder::fit(&training_set());
        let batch = vec![
            record(50, "F", &["Fever"], "Bacterial Infection", "Flu", &[]),
            record(40, "M", &["Fever"], "Viral Infection", "Flu", &[]),
        ];

        assert_eq!(
            encoder.transform_batch(&batch),
            Err(EncodingError::UnknownCause("Bacterial Infection".to_string()))
        );
    }

    #[test]
    fn test_unknown_disease_label_fails() {
        let targets = TargetEncoder::fit(&training_set());
        let batch = vec![
            record(40, "M", &["Fever"], "Viral Infection", "Flu", &[]),
            record(30, "F", &["Nausea"], "Viral Infection", "Gastritis", &[]),
        ];

        assert_eq!(
            targets.disease_labels(&batch),
            Err(EncodingError::UnknownLabel("Gastritis".to_string()))
        );
    }

    #[test]
    fn test_ensure_width() {
        assert!(ensure_width(array![1.0, 2.0].view(), 2).is_ok());
        assert_eq!(
            ensure_width(array![1.0].view(), 3),
            Err(EncodingError::WidthMismatch { expected: 3, actual: 1 })
        );
    }

    #[test]
    fn test_target_encoding() {
        let records = training_set();
        let targets = TargetEncoder::fit(&records);

        assert_eq!(targets.disease_vocabulary().labels(), ["Bronchitis", "Dermatitis", "Flu"]);
        assert_eq!(targets.disease_labels(&records), Ok(vec![2, 1, 0]));

        assert_eq!(
            targets.medicine_vocabulary().labels(),
            ["Cetirizine", "Hydrocortisone", "Paracetamol"]
        );
        assert_eq!(
            targets.medicine_labels(&records),
            array![
                [false, false, true],
                [true, true, false],
                [false, false, false],
            ]
        );
    }
}
