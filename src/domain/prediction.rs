//! Prediction result types and ranking policies.
//!
//! Probabilities come out of the models in vocabulary order; the functions
//! here threshold, sort and decode them into [`RankedLabel`]s.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::encoding::{EncodingError, Vocabulary};
use super::query::QueryError;

/// Default number of ranked entries returned per list.
pub const DEFAULT_TOP_K: usize = 5;

/// Default minimum disease probability (exclusive).
pub const DEFAULT_DISEASE_THRESHOLD: f64 = 0.2;

/// Default minimum medicine probability (exclusive) for threshold gating.
pub const DEFAULT_MEDICINE_THRESHOLD: f64 = 0.3;

/// A decoded label with its confidence percentage (0-100, 2 decimals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub name: String,
    pub confidence: f64,
}

impl RankedLabel {
    #[must_use]
    pub fn new(name: impl Into<String>, probability: f64) -> Self {
        Self {
            name: name.into(),
            confidence: to_percentage(probability),
        }
    }
}

/// Probability in [0, 1] to a percentage rounded to 2 decimals.
#[must_use]
pub fn to_percentage(probability: f64) -> f64 {
    (probability.clamp(0.0, 1.0) * 10_000.0).round() / 100.0
}

/// Medicine model output for one label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelProbability {
    /// Probability that the label applies
    pub present: f64,

    /// Binary multi-label prediction for the label
    pub flagged: bool,
}

impl LabelProbability {
    /// Probability of the more likely class (present or absent).
    #[must_use]
    pub fn max_class_probability(&self) -> f64 {
        self.present.max(1.0 - self.present)
    }
}

/// How medicine labels are selected from the medicine model output.
///
/// The two policies select different label sets for the same model output:
/// binary gating only reports labels the model predicts as present, while
/// threshold gating reports every label whose more likely class clears the
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RankingPolicy {
    /// Keep flagged labels, sort by confidence, keep the best `top_k`.
    BinaryGated { top_k: usize },

    /// Keep labels whose max class probability exceeds `threshold`.
    ThresholdGated { threshold: f64 },
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self::BinaryGated {
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RankingPolicy {
    #[must_use]
    pub fn threshold_gated() -> Self {
        Self::ThresholdGated {
            threshold: DEFAULT_MEDICINE_THRESHOLD,
        }
    }
}

impl std::str::FromStr for RankingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binary" | "binary_gated" | "binary-gated" => Ok(Self::default()),
            "threshold" | "threshold_gated" | "threshold-gated" => Ok(Self::threshold_gated()),
            other => Err(format!("unknown ranking policy: {other}")),
        }
    }
}

impl std::fmt::Display for RankingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BinaryGated { top_k } => write!(f, "binary-gated (top {top_k})"),
            Self::ThresholdGated { threshold } => write!(f, "threshold-gated (> {threshold})"),
        }
    }
}

/// Rank disease classes: best `top_k` by probability, then keep those above
/// `threshold`.
///
/// Ties keep vocabulary order.
#[must_use]
pub fn rank_diseases(
    probabilities: &[f64],
    vocabulary: &Vocabulary,
    top_k: usize,
    threshold: f64,
) -> Vec<RankedLabel> {
    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| descending(probabilities[a], probabilities[b]));

    order
        .into_iter()
        .take(top_k)
        .filter(|&idx| clears(probabilities[idx], threshold))
        .filter_map(|idx| {
            vocabulary
                .label(idx)
                .map(|name| RankedLabel::new(name, probabilities[idx]))
        })
        .collect()
}

/// Rank medicine labels with the given policy.
///
/// Binary gating truncates to its `top_k`; threshold gating returns every
/// label that clears the threshold.
#[must_use]
pub fn rank_medicines(
    outputs: &[LabelProbability],
    vocabulary: &Vocabulary,
    policy: RankingPolicy,
) -> Vec<RankedLabel> {
    let mut selected: Vec<(usize, f64)> = outputs
        .iter()
        .enumerate()
        .filter(|(_, out)| match policy {
            RankingPolicy::BinaryGated { .. } => out.flagged,
            RankingPolicy::ThresholdGated { threshold } => {
                clears(out.max_class_probability(), threshold)
            }
        })
        .map(|(idx, out)| (idx, out.max_class_probability()))
        .collect();

    selected.sort_by(|a, b| descending(a.1, b.1));

    if let RankingPolicy::BinaryGated { top_k } = policy {
        selected.truncate(top_k);
    }

    selected
        .into_iter()
        .filter_map(|(idx, p)| vocabulary.label(idx).map(|name| RankedLabel::new(name, p)))
        .collect()
}

/// Strictly above the threshold, both as a probability and once rounded.
fn clears(probability: f64, threshold: f64) -> bool {
    probability > threshold && to_percentage(probability) > to_percentage(threshold)
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Highest-confidence entry; the first one wins ties.
#[must_use]
pub fn best_of(labels: &[RankedLabel]) -> Option<&RankedLabel> {
    labels.iter().fold(None, |best: Option<&RankedLabel>, item| match best {
        Some(b) if b.confidence >= item.confidence => Some(b),
        _ => Some(item),
    })
}

/// Ranked disease and medicine lists for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPrediction {
    /// Best disease, if any cleared its threshold
    pub disease: Option<RankedLabel>,

    /// Best medicine, if any was selected
    pub medicine: Option<RankedLabel>,

    pub diseases: Vec<RankedLabel>,
    pub medicines: Vec<RankedLabel>,
}

impl RankedPrediction {
    #[must_use]
    pub fn new(diseases: Vec<RankedLabel>, medicines: Vec<RankedLabel>) -> Self {
        Self {
            disease: best_of(&diseases).cloned(),
            medicine: best_of(&medicines).cloned(),
            diseases,
            medicines,
        }
    }

    /// Both lists have at least one entry.
    #[must_use]
    pub fn is_conclusive(&self) -> bool {
        self.disease.is_some() && self.medicine.is_some()
    }
}

/// Single most likely disease and medicine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPrediction {
    pub disease: RankedLabel,
    pub medicine: RankedLabel,
}

/// Category of a failed prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Query failed validation
    InvalidInput,
    /// Query category not present in the training vocabulary
    UnknownCategory,
    /// Encoded query does not match the model width
    FeatureMismatch,
    /// No candidate cleared its confidence threshold
    Inconclusive,
}

/// A prediction that could not be produced, with a displayable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionFailure {
    pub kind: FailureKind,
    pub error: String,
}

impl PredictionFailure {
    #[must_use]
    pub fn inconclusive(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Inconclusive,
            error: message.into(),
        }
    }
}

impl From<QueryError> for PredictionFailure {
    fn from(err: QueryError) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            error: err.to_string(),
        }
    }
}

impl From<EncodingError> for PredictionFailure {
    fn from(err: EncodingError) -> Self {
        let kind = match err {
            EncodingError::UnknownCause(_) | EncodingError::UnknownLabel(_) => {
                FailureKind::UnknownCategory
            }
            EncodingError::WidthMismatch { .. } => FailureKind::FeatureMismatch,
        };
        Self {
            kind,
            error: err.to_string(),
        }
    }
}

impl std::fmt::Display for PredictionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

/// Either a populated prediction or a typed failure.
///
/// Serializes as the prediction itself, or as `{"kind": .., "error": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionOutcome<T> {
    Ready(T),
    Failed(PredictionFailure),
}

impl<T> PredictionOutcome<T> {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&PredictionFailure> {
        match self {
            Self::Ready(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// Convert into a `Result` for `?`-style handling.
    ///
    /// # Errors
    /// Returns the failure if the prediction was not produced.
    pub fn into_result(self) -> Result<T, PredictionFailure> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Failed(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, PredictionFailure>> for PredictionOutcome<T> {
    fn from(result: Result<T, PredictionFailure>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(failure) => Self::Failed(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(labels: &[&str]) -> Vocabulary {
        Vocabulary::fit(labels.iter().copied())
    }

    fn output(present: f64) -> LabelProbability {
        LabelProbability {
            present,
            flagged: present > 0.5,
        }
    }

    #[test]
    fn test_percentage_rounding() {
        assert!((to_percentage(0.123_456) - 12.35).abs() < 1e-9);
        assert!((to_percentage(1.0) - 100.0).abs() < 1e-9);
        assert!((to_percentage(1.2) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_diseases_top_k_and_threshold() {
        let vocabulary = vocab(&["A", "B", "C", "D", "E", "F", "G"]);
        let probs = [0.05, 0.30, 0.21, 0.20, 0.10, 0.09, 0.05];

        let ranked = rank_diseases(&probs, &vocabulary, 5, 0.2);
        let names: Vec<_> = ranked.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, vec!["B", "C"]);
        assert!((ranked[0].confidence - 30.0).abs() < 1e-9);
        assert!(ranked.iter().all(|r| r.confidence > 20.0));
    }

    #[test]
    fn test_rank_diseases_sorted_and_bounded() {
        let vocabulary = vocab(&["A", "B", "C", "D", "E", "F", "G"]);
        let probs = [0.9, 0.95, 0.5, 0.6, 0.7, 0.8, 0.99];

        let ranked = rank_diseases(&probs, &vocabulary, 5, 0.2);
        assert_eq!(ranked.len(), 5);
        assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert_eq!(ranked[0].name, "G");
    }

    #[test]
    fn test_rank_diseases_inconclusive() {
        let vocabulary = vocab(&["A", "B", "C", "D", "E"]);
        let probs = [0.2, 0.2, 0.2, 0.2, 0.2];
        assert!(rank_diseases(&probs, &vocabulary, 5, 0.2).is_empty());
    }

    #[test]
    fn test_binary_gated_medicines() {
        let vocabulary = vocab(&["M1", "M2", "M3", "M4", "M5", "M6", "M7"]);
        let outputs: Vec<_> = [0.9, 0.1, 0.6, 0.55, 0.95, 0.7, 0.8]
            .into_iter()
            .map(output)
            .collect();

        let ranked = rank_medicines(&outputs, &vocabulary, RankingPolicy::default());
        let names: Vec<_> = ranked.iter().map(|r| r.name.as_str()).collect();

        // M2 is not flagged even though its absent-class probability is high.
        assert_eq!(names, vec!["M5", "M1", "M7", "M6", "M3"]);
    }

    #[test]
    fn test_threshold_gated_medicines() {
        let vocabulary = vocab(&["M1", "M2", "M3"]);
        let outputs = vec![
            output(0.6),
            output(0.1),
            LabelProbability {
                present: 0.5,
                flagged: false,
            },
        ];

        let ranked = rank_medicines(&outputs, &vocabulary, RankingPolicy::threshold_gated());
        let names: Vec<_> = ranked.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, vec!["M2", "M1", "M3"]);
        assert!(ranked.iter().all(|r| r.confidence > 30.0));
        assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_threshold_gated_respects_custom_threshold() {
        let vocabulary = vocab(&["M1", "M2"]);
        let outputs = vec![output(0.65), output(0.9)];
        let policy = RankingPolicy::ThresholdGated { threshold: 0.7 };

        let ranked = rank_medicines(&outputs, &vocabulary, policy);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "M2");
    }

    #[test]
    fn test_best_of_prefers_first_on_tie() {
        let labels = vec![
            RankedLabel::new("first", 0.5),
            RankedLabel::new("second", 0.5),
        ];
        assert_eq!(best_of(&labels).map(|l| l.name.as_str()), Some("first"));
        assert!(best_of(&[]).is_none());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("binary".parse::<RankingPolicy>(), Ok(RankingPolicy::default()));
        assert_eq!(
            "Threshold".parse::<RankingPolicy>(),
            Ok(RankingPolicy::threshold_gated())
        );
        assert!("fuzzy".parse::<RankingPolicy>().is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let ok: PredictionOutcome<RankedLabel> =
            PredictionOutcome::Ready(RankedLabel::new("Flu", 0.9));
        let json = serde_json::to_value(&ok).expect("Should serialize");
        assert_eq!(json["name"], "Flu");

        let failed: PredictionOutcome<RankedLabel> =
            PredictionOutcome::Failed(QueryError::EmptyCause.into());
        let json = serde_json::to_value(&failed).expect("Should serialize");
        assert_eq!(json["kind"], "invalid_input");
        assert_eq!(json["error"], "Cause cannot be empty");
    }

    #[test]
    fn test_encoding_error_kinds() {
        let unknown: PredictionFailure = EncodingError::UnknownCause("x".into()).into();
        assert_eq!(unknown.kind, FailureKind::UnknownCategory);

        let width: PredictionFailure = EncodingError::WidthMismatch {
            expected: 3,
            actual: 2,
        }
        .into();
        assert_eq!(width.kind, FailureKind::FeatureMismatch);
    }
}
