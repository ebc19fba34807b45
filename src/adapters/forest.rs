//! Random forest for multi-label classification.
//!
//! Every tree is grown on a bootstrap sample with a random subset of
//! candidate features per node, and predicts all labels at once. The
//! probability of a label is the mean of the tree leaf frequencies.

use ndarray::ArrayView1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use crate::domain::{FeatureMatrix, LabelMatrix};
use crate::ports::{check_shape, ModelError, MultiLabelClassifier, MultiLabelTrainer};

/// Number of features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of the feature count
    Sqrt,
    /// All features
    All,
    /// A fixed number of features
    Fixed(usize),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> Option<usize> {
        match self {
            Self::Sqrt => Some(((n_features as f64).sqrt() as usize).max(1)),
            Self::All => None,
            Self::Fixed(k) => Some(k.max(1)),
        }
    }
}

/// Hyper-parameters for the random forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    pub n_estimators: usize,

    /// Features examined per split
    pub max_features: MaxFeatures,

    /// Maximum tree depth (`None` grows until leaves are pure)
    pub max_depth: Option<usize>,

    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,

    /// Seed for bootstrap and feature sampling
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Trainer producing [`RandomForestClassifier`]s.
#[derive(Debug, Clone, Default)]
pub struct RandomForestTrainer {
    config: ForestConfig,
}

impl RandomForestTrainer {
    #[must_use]
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

/// A fitted multi-label random forest.
#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    n_features: usize,
    n_labels: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl MultiLabelClassifier for RandomForestClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_labels(&self) -> usize {
        self.n_labels
    }

    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_labels];
        if self.trees.is_empty() {
            return totals;
        }

        for tree in &self.trees {
            for (total, value) in totals.iter_mut().zip(tree.predict(row)) {
                *total += value;
            }
        }

        let n_trees = self.trees.len() as f64;
        totals.iter_mut().for_each(|t| *t /= n_trees);
        totals
    }
}

impl MultiLabelTrainer for RandomForestTrainer {
    type Model = RandomForestClassifier;

    fn fit(&self, rows: &FeatureMatrix, labels: &LabelMatrix) -> Result<Self::Model, ModelError> {
        if self.config.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        let n_features = check_shape(rows, labels.nrows())?;
        let n_labels = labels.ncols();

        let mut model = RandomForestClassifier {
            n_features,
            n_labels,
            trees: Vec::with_capacity(self.config.n_estimators),
        };

        if n_labels == 0 {
            tracing::debug!("Random forest: no labels to learn, skipping trees");
            return Ok(model);
        }

        let targets = labels.mapv(|present| if present { 1.0 } else { 0.0 });

        let params = TreeParams {
            max_depth: self.config.max_depth,
            max_features: self.config.max_features.resolve(n_features),
            ..TreeParams::default()
        };

        let n_samples = rows.nrows();
        let mut master = ChaCha20Rng::seed_from_u64(self.config.seed);

        for _ in 0..self.config.n_estimators {
            let mut rng = ChaCha20Rng::seed_from_u64(master.gen());
            let samples: Vec<usize> = if self.config.bootstrap {
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };

            model
                .trees
                .push(DecisionTree::fit(rows, &targets, &samples, &params, &mut rng));
        }

        tracing::debug!(
            "Random forest: {} trees over {} samples, {} labels",
            model.trees.len(),
            n_samples,
            n_labels
        );

        Ok(model)
    }
}
