//! Query-time patient input.
//!
//! Unlike training records, a query is validated strictly: any violation is
//! an error for the caller, never a silent drop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::safe_split;

/// Inclusive age bounds accepted at query time.
pub const MIN_AGE: i64 = 0;
pub const MAX_AGE: i64 = 120;

/// Errors raised while validating a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid age: {0} (expected {MIN_AGE}-{MAX_AGE})")]
    InvalidAge(String),

    #[error("Invalid gender: {0:?} (expected M or F)")]
    InvalidGender(String),

    #[error("No valid symptoms provided")]
    EmptySymptoms,

    #[error("Cause cannot be empty")]
    EmptyCause,
}

/// Loosely-typed query as received from an outer interface.
///
/// `age` may be a number or a numeric string; a missing age counts as 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryInput {
    #[serde(default)]
    pub age: Option<Value>,

    #[serde(default)]
    pub gender: String,

    #[serde(default)]
    pub symptoms: String,

    #[serde(default)]
    pub cause: String,
}

/// A validated patient query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientQuery {
    age: u32,
    gender: String,
    symptoms: Vec<String>,
    cause: String,
}

impl PatientQuery {
    /// Validate a query from typed parts.
    ///
    /// # Errors
    /// Returns the first validation failure found (age, gender, symptoms, cause).
    pub fn new(age: i64, gender: &str, symptoms: &str, cause: &str) -> Result<Self, QueryError> {
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(QueryError::InvalidAge(age.to_string()));
        }
        let age = u32::try_from(age).map_err(|_| QueryError::InvalidAge(age.to_string()))?;

        let gender = gender.trim().to_uppercase();
        if gender != "M" && gender != "F" {
            return Err(QueryError::InvalidGender(gender));
        }

        let symptoms = safe_split(symptoms);
        if symptoms.is_empty() {
            return Err(QueryError::EmptySymptoms);
        }

        let cause = cause.trim();
        if cause.is_empty() {
            return Err(QueryError::EmptyCause);
        }

        Ok(Self {
            age,
            gender,
            symptoms,
            cause: cause.to_string(),
        })
    }

    #[must_use]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[must_use]
    pub fn gender(&self) -> &str {
        &self.gender
    }

    #[must_use]
    pub fn is_male(&self) -> bool {
        self.gender == "M"
    }

    #[must_use]
    pub fn symptoms(&self) -> &[String] {
        &self.symptoms
    }

    #[must_use]
    pub fn cause(&self) -> &str {
        &self.cause
    }
}

impl TryFrom<&QueryInput> for PatientQuery {
    type Error = QueryError;

    fn try_from(input: &QueryInput) -> Result<Self, Self::Error> {
        let age = coerce_query_age(input.age.as_ref())?;
        Self::new(age, &input.gender, &input.symptoms, &input.cause)
    }
}

fn coerce_query_age(value: Option<&Value>) -> Result<i64, QueryError> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .ok_or_else(|| QueryError::InvalidAge(n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| QueryError::InvalidAge(s.clone())),
        Some(other) => Err(QueryError::InvalidAge(other.to_string())),
    }
}
