//! Gradient-boosted trees for single-label (multi-class) classification.
//!
//! Multinomial deviance with one regression tree per class and stage:
//! - raw scores start at the log class priors
//! - each stage fits depth-limited trees to the softmax residuals
//! - leaf values take a single Newton step, scaled by `(K - 1) / K`
//!
//! Classes that never occur in the training rows keep probability 0.
//! With a single observed class every prediction is that class with
//! probability 1.

use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use crate::domain::FeatureMatrix;
use crate::ports::{check_shape, ModelError, SingleLabelClassifier, SingleLabelTrainer};

/// Denominators below this produce a zero leaf update.
const MIN_DENOMINATOR: f64 = 1e-150;

/// Hyper-parameters for gradient boosting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Number of boosting stages
    pub n_estimators: usize,

    /// Shrinkage applied to every tree
    pub learning_rate: f64,

    /// Depth of each regression tree
    pub max_depth: usize,

    /// Seed for tree construction
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            seed: 42,
        }
    }
}

/// Trainer producing [`GradientBoostingClassifier`]s.
#[derive(Debug, Clone, Default)]
pub struct GradientBoostingTrainer {
    config: BoostingConfig,
}

impl GradientBoostingTrainer {
    #[must_use]
    pub fn new(config: BoostingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.config.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.config.learning_rate.is_finite() && self.config.learning_rate > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.config.learning_rate
            )));
        }
        if self.config.max_depth == 0 {
            return Err(ModelError::InvalidParameter(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One fitted tree for one class.
#[derive(Debug, Clone)]
struct ClassTree {
    class: usize,
    tree: DecisionTree,
}

/// A fitted gradient-boosted multi-class classifier.
#[derive(Debug, Clone)]
pub struct GradientBoostingClassifier {
    n_features: usize,
    n_classes: usize,
    learning_rate: f64,

    /// Classes observed during training
    active: Vec<usize>,

    /// Log prior per class (meaningful for active classes only)
    init: Vec<f64>,

    stages: Vec<Vec<ClassTree>>,
}

impl GradientBoostingClassifier {
    /// Number of boosting stages fitted.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Classes that occurred in the training rows.
    #[must_use]
    pub fn observed_classes(&self) -> &[usize] {
        &self.active
    }

    fn raw_scores(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut scores = Array1::from(self.init.clone());
        for stage in &self.stages {
            for ClassTree { class, tree } in stage {
                scores[*class] += self.learning_rate * leaf_value(tree, row);
            }
        }
        scores
    }
}

impl SingleLabelClassifier for GradientBoostingClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let scores = self.raw_scores(row);
        softmax(scores.view(), &self.active, self.n_classes)
    }
}

impl SingleLabelTrainer for GradientBoostingTrainer {
    type Model = GradientBoostingClassifier;

    fn fit(
        &self,
        rows: &FeatureMatrix,
        labels: &[usize],
        n_classes: usize,
    ) -> Result<Self::Model, ModelError> {
        self.validate()?;
        let n_features = check_shape(rows, labels.len())?;
        if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(ModelError::LabelOutOfRange { label, n_classes });
        }

        let n_samples = labels.len();
        let mut counts = vec![0usize; n_classes];
        for &label in labels {
            counts[label] += 1;
        }
        let active: Vec<usize> = (0..n_classes).filter(|&k| counts[k] > 0).collect();

        let init: Vec<f64> = counts
            .iter()
            .map(|&c| {
                if c > 0 {
                    (c as f64 / n_samples as f64).ln()
                } else {
                    f64::NEG_INFINITY
                }
            })
            .collect();

        let mut model = GradientBoostingClassifier {
            n_features,
            n_classes,
            learning_rate: self.config.learning_rate,
            active,
            init,
            stages: Vec::new(),
        };

        if model.active.len() < 2 {
            tracing::debug!(
                "Gradient boosting: {} observed class(es), skipping tree stages",
                model.active.len()
            );
            return Ok(model);
        }

        let params = TreeParams {
            max_depth: Some(self.config.max_depth),
            ..TreeParams::default()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(self.config.seed);
        let samples: Vec<usize> = (0..n_samples).collect();
        let k_active = model.active.len() as f64;
        let newton_scale = (k_active - 1.0) / k_active;

        let mut scores = Array2::from_shape_fn((n_samples, n_classes), |(_, k)| model.init[k]);

        for stage_idx in 0..self.config.n_estimators {
            let probabilities: Vec<Vec<f64>> = scores
                .outer_iter()
                .map(|s| softmax(s, &model.active, n_classes))
                .collect();

            let mut stage = Vec::with_capacity(model.active.len());
            for &class in &model.active {
                let residuals = Array2::from_shape_fn((n_samples, 1), |(i, _)| {
                    let y = if labels[i] == class { 1.0 } else { 0.0 };
                    y - probabilities[i][class]
                });

                let mut tree = DecisionTree::fit(rows, &residuals, &samples, &params, &mut rng);
                newton_update(&mut tree, rows, &residuals, newton_scale);

                for (i, row) in rows.outer_iter().enumerate() {
                    scores[[i, class]] += self.config.learning_rate * leaf_value(&tree, row);
                }
                stage.push(ClassTree { class, tree });
            }
            model.stages.push(stage);

            if stage_idx == 0 || (stage_idx + 1) % 25 == 0 {
                tracing::debug!(
                    "Gradient boosting stage {}/{}",
                    stage_idx + 1,
                    self.config.n_estimators
                );
            }
        }

        Ok(model)
    }
}

/// Replace each leaf mean with a Newton step for the multinomial deviance.
fn newton_update(
    tree: &mut DecisionTree,
    rows: &FeatureMatrix,
    residuals: &Array2<f64>,
    scale: f64,
) {
    let mut numerator = vec![0.0; tree.node_count()];
    let mut denominator = vec![0.0; tree.node_count()];

    for (row, &r) in rows.outer_iter().zip(residuals.column(0)) {
        let leaf = tree.apply(row);
        numerator[leaf] += r;
        denominator[leaf] += r.abs() * (1.0 - r.abs());
    }

    for leaf in tree.leaves() {
        let value = if denominator[leaf].abs() < MIN_DENOMINATOR {
            0.0
        } else {
            scale * numerator[leaf] / denominator[leaf]
        };
        tree.set_leaf_value(leaf, vec![value]);
    }
}

/// Single-output leaf value of a regression tree.
fn leaf_value(tree: &DecisionTree, row: ArrayView1<'_, f64>) -> f64 {
    tree.predict(row).first().copied().unwrap_or(0.0)
}

/// Softmax over the active classes; inactive classes get 0.
fn softmax(scores: ArrayView1<'_, f64>, active: &[usize], n_classes: usize) -> Vec<f64> {
    let mut out = vec![0.0; n_classes];
    if active.is_empty() {
        return out;
    }

    let max = active
        .iter()
        .map(|&k| scores[k])
        .fold(f64::NEG_INFINITY, f64::max);

    let mut total = 0.0;
    for &k in active {
        let e = (scores[k] - max).exp();
        out[k] = e;
        total += e;
    }
    if total > 0.0 {
        for &k in active {
            out[k] /= total;
        }
    }
    out
}
