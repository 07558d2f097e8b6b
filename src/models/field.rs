//! Field and prediction types shared across the engine.
//!
//! A `PredictionRequest` goes into the model chain; a `PredictionOutcome`
//! comes back with the predicted fields and a full trace of which backends
//! were tried and how each attempt ended.

use serde::{Deserialize, Serialize};

/// Supported form field types for legal documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Email,
    Phone,
    Date,
    Address,
    Party,
    Amount,
    Signature,
    Checkbox,
    Select,
}

impl FieldType {
    /// Field types whose value is legally load-bearing: an empty corrected
    /// value for one of these is a critical validation issue.
    pub fn is_legally_required(&self) -> bool {
        matches!(self, FieldType::Party | FieldType::Date | FieldType::Signature)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Date => "date",
            FieldType::Address => "address",
            FieldType::Party => "party",
            FieldType::Amount => "amount",
            FieldType::Signature => "signature",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
        };
        write!(f, "{label}")
    }
}

/// A lower-ranked candidate value for a predicted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAlternative {
    pub value: String,
    pub confidence: f32,
}

/// One field predicted by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedField {
    pub name: String,
    pub field_type: FieldType,
    pub value: String,
    /// Backend-reported confidence in [0, 1].
    pub confidence: f32,
    /// Which backend produced this field. Downstream components weight
    /// corrections by original provenance.
    pub source_backend: String,
    #[serde(default)]
    pub alternatives: Vec<FieldAlternative>,
}

/// A request for field predictions over one document.
///
/// Immutable once submitted; the orchestrator only borrows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub document_text: String,
    #[serde(default)]
    pub document_type_hint: Option<String>,
    /// Field names the caller wants. Empty means the backend decides.
    #[serde(default)]
    pub requested_fields: Vec<String>,
}

impl PredictionRequest {
    pub fn new(document_text: impl Into<String>) -> Self {
        Self {
            document_text: document_text.into(),
            document_type_hint: None,
            requested_fields: Vec::new(),
        }
    }

    /// True if the caller asked for this field name (or asked for everything).
    pub fn wants_field(&self, name: &str) -> bool {
        self.requested_fields.is_empty()
            || self
                .requested_fields
                .iter()
                .any(|f| f.eq_ignore_ascii_case(name))
    }
}

/// How a single backend attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { reason: String },
    TimedOut,
    /// The breaker was open; no call was made.
    CircuitOpen,
    /// The governor denied admission; backend skipped, no call made.
    AdmissionSkipped,
    /// The backend answered, but with zero fields or nothing above the
    /// confidence floor.
    Implausible,
    Cancelled,
}

/// One entry in the attempt trace: which backend, which try, what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub backend: String,
    /// 1-based attempt number within this backend's retry budget.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

/// The result of running a prediction request through the chain.
///
/// Owned exclusively by the caller; the orchestrator keeps no reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub fields: Vec<PredictedField>,
    /// Which backends were tried, in order, with the outcome of each attempt.
    pub attempt_trace: Vec<AttemptRecord>,
}

impl PredictionOutcome {
    /// Highest confidence across predicted fields (0.0 when empty).
    pub fn top_confidence(&self) -> f32 {
        self.fields
            .iter()
            .map(|f| f.confidence)
            .fold(0.0_f32, f32::max)
    }
}
