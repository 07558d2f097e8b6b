//! Correction types — a human's fix to a predicted field value.
//!
//! A `Correction` is immutable after creation. Superseding fixes are new
//! entities; nothing here is ever edited in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::field::PredictedField;

/// Why the human corrected the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The prediction was dangerously wrong (wrong party, wrong date).
    /// Always routed to the immediate tier regardless of confidence.
    CriticalError,
    WrongValue,
    MissingValue,
    Formatting,
    Other,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReasonCode::CriticalError => "critical_error",
            ReasonCode::WrongValue => "wrong_value",
            ReasonCode::MissingValue => "missing_value",
            ReasonCode::Formatting => "formatting",
            ReasonCode::Other => "other",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for ReasonCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical_error" => Ok(ReasonCode::CriticalError),
            "wrong_value" => Ok(ReasonCode::WrongValue),
            "missing_value" => Ok(ReasonCode::MissingValue),
            "formatting" => Ok(ReasonCode::Formatting),
            "other" => Ok(ReasonCode::Other),
            other => Err(format!("unknown reason code: {other}")),
        }
    }
}

/// A human correction to one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub id: Uuid,
    pub field_id: String,
    /// Snapshot of the prediction being corrected. Immutable.
    pub original_prediction: PredictedField,
    pub corrected_value: String,
    pub reason_code: ReasonCode,
    pub submitted_at: DateTime<Utc>,
    pub actor_id: String,
}

impl Correction {
    /// Build a new correction stamped with a fresh id and the current time.
    pub fn new(
        field_id: impl Into<String>,
        original_prediction: PredictedField,
        corrected_value: impl Into<String>,
        reason_code: ReasonCode,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            field_id: field_id.into(),
            original_prediction,
            corrected_value: corrected_value.into(),
            reason_code,
            submitted_at: Utc::now(),
            actor_id: actor_id.into(),
        }
    }
}

/// Concurrent corrections targeting the same field, awaiting resolution.
///
/// Transient: consumed by the conflict resolver, never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSet {
    pub field_id: String,
    pub corrections: Vec<Correction>,
}

impl ConflictSet {
    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }
}
