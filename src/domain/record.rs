//! Patient record types and training-data normalization.
//!
//! Records arrive from the JSON store as loosely-typed mappings. The
//! normalizer coerces each one into a [`PatientRecord`] or rejects it with a
//! [`RejectReason`]; a bad record never fails the rest of the batch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record exactly as it was read from the store.
pub type RawRecord = Value;

/// Field names used by the record store.
pub const FIELD_AGE: &str = "Age";
pub const FIELD_GENDER: &str = "Gender";
pub const FIELD_SYMPTOMS: &str = "Symptoms";
pub const FIELD_CAUSES: &str = "Causes";
pub const FIELD_DISEASE: &str = "Disease";
pub const FIELD_MEDICINE: &str = "Medicine";

/// Canonical training record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Age in years
    pub age: u32,

    /// Trimmed, upper-cased gender ("M", "F", or whatever the source held)
    pub gender: String,

    /// Symptom tokens, in source order
    pub symptoms: Vec<String>,

    /// Single cause category (trimmed, may be empty)
    pub cause: String,

    /// Disease label (trimmed, never empty)
    pub disease: String,

    /// Medicine labels, possibly empty
    pub medicines: Vec<String>,
}

impl PatientRecord {
    /// Binary gender feature: the normalized value starts with "M".
    #[must_use]
    pub fn is_male(&self) -> bool {
        self.gender.starts_with('M')
    }
}

/// Why a raw record was not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("invalid age: {0}")]
    InvalidAge(String),

    #[error("field {0} has a non-scalar value")]
    NonScalarField(String),

    #[error("missing disease")]
    MissingDisease,

    #[error("missing symptoms")]
    MissingSymptoms,
}

/// A record that was dropped during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position in the input batch
    pub index: usize,

    pub reason: RejectReason,
}

/// Result of normalizing a single raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Accepted(PatientRecord),
    Rejected(RejectedRecord),
}

/// Accepted records and rejections from one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub accepted: Vec<PatientRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl NormalizedBatch {
    /// Number of input records seen.
    #[must_use]
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Split a comma-separated value into trimmed, non-empty tokens.
#[must_use]
pub fn safe_split(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize one raw record.
#[must_use]
pub fn normalize_record(index: usize, raw: &RawRecord) -> RecordOutcome {
    match coerce(raw) {
        Ok(record) => RecordOutcome::Accepted(record),
        Err(reason) => RecordOutcome::Rejected(RejectedRecord { index, reason }),
    }
}

/// Normalize a whole batch, collecting rejections separately.
#[must_use]
pub fn normalize_records(raw: &[RawRecord]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, record) in raw.iter().enumerate() {
        match normalize_record(index, record) {
            RecordOutcome::Accepted(record) => batch.accepted.push(record),
            RecordOutcome::Rejected(rejected) => {
                tracing::warn!(
                    "Skipping invalid record #{}: {}",
                    rejected.index,
                    rejected.reason
                );
                batch.rejected.push(rejected);
            }
        }
    }

    tracing::debug!(
        "Normalized {} records: {} accepted, {} rejected",
        batch.total(),
        batch.accepted.len(),
        batch.rejected.len()
    );

    batch
}

fn coerce(raw: &RawRecord) -> Result<PatientRecord, RejectReason> {
    let map = raw.as_object().ok_or(RejectReason::NotAnObject)?;

    let age = coerce_age(map.get(FIELD_AGE))?;
    let gender = text_field(map, FIELD_GENDER)?.trim().to_uppercase();
    let symptoms = safe_split(&text_field(map, FIELD_SYMPTOMS)?);
    let cause = text_field(map, FIELD_CAUSES)?.trim().to_string();
    let disease = text_field(map, FIELD_DISEASE)?.trim().to_string();
    let medicines = safe_split(&text_field(map, FIELD_MEDICINE)?);

    if disease.is_empty() {
        return Err(RejectReason::MissingDisease);
    }
    if symptoms.is_empty() {
        return Err(RejectReason::MissingSymptoms);
    }

    Ok(PatientRecord {
        age,
        gender,
        symptoms,
        cause,
        disease,
        medicines,
    })
}

/// Coerce an age value the way an integer cast of the stored value would.
///
/// Missing keys count as 0; `null` does not.
fn coerce_age(value: Option<&Value>) -> Result<u32, RejectReason> {
    let age: i64 = match value {
        None => 0,
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i
            } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                f.trunc() as i64
            } else {
                return Err(RejectReason::InvalidAge(n.to_string()));
            }
        }
        Some(Value::Bool(b)) => i64::from(*b),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| RejectReason::InvalidAge(s.clone()))?,
        Some(other) => return Err(RejectReason::InvalidAge(other.to_string())),
    };

    u32::try_from(age).map_err(|_| RejectReason::InvalidAge(age.to_string()))
}

fn text_field(map: &Map<String, Value>, key: &str) -> Result<String, RejectReason> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(RejectReason::NonScalarField(key.to_string())),
    }
}
