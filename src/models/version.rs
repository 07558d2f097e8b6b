//! Field version history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What produced a field version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    Prediction,
    Correction,
    Rollback,
}

impl std::fmt::Display for VersionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VersionSource::Prediction => "prediction",
            VersionSource::Correction => "correction",
            VersionSource::Rollback => "rollback",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for VersionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prediction" => Ok(VersionSource::Prediction),
            "correction" => Ok(VersionSource::Correction),
            "rollback" => Ok(VersionSource::Rollback),
            other => Err(format!("unknown version source: {other}")),
        }
    }
}

/// One immutable entry in a field's append-only value history.
///
/// `version_id` is monotonically increasing per field, starting at 1.
/// `previous_version_id` is `None` only for a field's first version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldVersion {
    pub field_id: String,
    pub version_id: i64,
    pub value: String,
    pub confidence: f32,
    pub produced_by: VersionSource,
    pub recorded_at: DateTime<Utc>,
    pub previous_version_id: Option<i64>,
}
