//! Classifier ports: Traits for trainable probabilistic models.
//!
//! A trainer holds hyper-parameters and produces an immutable fitted model.
//! Fitted models only expose `&self` inference, so a trained predictor can
//! be shared read-only.

use ndarray::ArrayView1;

use crate::domain::{FeatureMatrix, LabelMatrix};

/// Errors raised when a trainer receives unusable input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Row/target count mismatch: {rows} rows, {targets} targets")]
    TargetCountMismatch { rows: usize, targets: usize },

    #[error("Label {label} out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },

    #[error("Invalid hyper-parameter: {0}")]
    InvalidParameter(String),
}

/// A fitted single-label classifier.
pub trait SingleLabelClassifier: Send + Sync {
    /// Number of input features expected per row.
    fn n_features(&self) -> usize;

    /// Number of classes in the output distribution.
    fn n_classes(&self) -> usize;

    /// Class probability distribution for one row (sums to 1).
    ///
    /// The caller is responsible for passing a row of `n_features()` width.
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Vec<f64>;

    /// Most likely class; the lowest index wins ties.
    fn predict(&self, row: ArrayView1<'_, f64>) -> usize {
        argmax(&self.predict_proba(row))
    }
}

/// A fitted multi-label classifier with an independent output per label.
pub trait MultiLabelClassifier: Send + Sync {
    /// Number of input features expected per row.
    fn n_features(&self) -> usize;

    /// Number of labels.
    fn n_labels(&self) -> usize;

    /// Probability that each label applies.
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Vec<f64>;

    /// Binary prediction per label (present when more likely than absent).
    fn predict(&self, row: ArrayView1<'_, f64>) -> Vec<bool> {
        self.predict_proba(row).into_iter().map(|p| p > 0.5).collect()
    }
}

/// Builds a [`SingleLabelClassifier`] from encoded data.
pub trait SingleLabelTrainer {
    type Model: SingleLabelClassifier;

    /// Fit a model on `rows` with class indices `labels` in `0..n_classes`.
    ///
    /// # Errors
    /// Returns `ModelError` if the data is empty or inconsistent.
    fn fit(
        &self,
        rows: &FeatureMatrix,
        labels: &[usize],
        n_classes: usize,
    ) -> Result<Self::Model, ModelError>;
}

/// Builds a [`MultiLabelClassifier`] from encoded data.
pub trait MultiLabelTrainer {
    type Model: MultiLabelClassifier;

    /// Fit a model on `rows` with one indicator row per sample; the label
    /// count is the number of indicator columns.
    ///
    /// # Errors
    /// Returns `ModelError` if the data is empty or inconsistent.
    fn fit(&self, rows: &FeatureMatrix, labels: &LabelMatrix) -> Result<Self::Model, ModelError>;
}

/// Index of the largest value; first index on ties, 0 for an empty slice.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = idx;
        }
    }
    best
}

/// Validate the shape of a training set and return its feature width.
///
/// # Errors
/// Returns `ModelError` on empty input or a target count mismatch.
pub fn check_shape(rows: &FeatureMatrix, n_targets: usize) -> Result<usize, ModelError> {
    if rows.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    if rows.nrows() != n_targets {
        return Err(ModelError::TargetCountMismatch {
            rows: rows.nrows(),
            targets: n_targets,
        });
    }
    Ok(rows.ncols())
}
