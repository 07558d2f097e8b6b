//! Durable correction log — every submitted correction, whatever became
//! of it.
//!
//! Losing corrections from a conflict are never discarded: they stay here
//! as `superseded` entries. Rejected and unresolved corrections are kept
//! for audit as well. The only mutation allowed is moving a `pending`
//! (batched) entry to its final disposition.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Correction, PredictedField, ReasonCode};

/// Disposition of a logged correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    /// Queued in the batched tier, not yet committed.
    Pending,
    /// Won (or had no conflict) and produced a field version.
    Applied,
    /// Lost a conflict; its value never reached a field version.
    Superseded,
    /// Failed validation; never eligible for commit.
    Rejected,
    /// Part of a conflict set under the manual policy; awaiting a human.
    Unresolved,
}

impl std::fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CorrectionStatus::Pending => "pending",
            CorrectionStatus::Applied => "applied",
            CorrectionStatus::Superseded => "superseded",
            CorrectionStatus::Rejected => "rejected",
            CorrectionStatus::Unresolved => "unresolved",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for CorrectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CorrectionStatus::Pending),
            "applied" => Ok(CorrectionStatus::Applied),
            "superseded" => Ok(CorrectionStatus::Superseded),
            "rejected" => Ok(CorrectionStatus::Rejected),
            "unresolved" => Ok(CorrectionStatus::Unresolved),
            other => Err(format!("unknown correction status: {other}")),
        }
    }
}

/// A correction as stored in the log, with its disposition.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedCorrection {
    pub correction: Correction,
    pub status: CorrectionStatus,
    /// The field version this correction produced, if it was applied.
    pub version_id: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

/// Insert a correction with its initial status.
pub fn insert_correction(
    conn: &Connection,
    correction: &Correction,
    status: CorrectionStatus,
    version_id: Option<i64>,
) -> Result<(), DatabaseError> {
    let snapshot = serde_json::to_string(&correction.original_prediction)?;

    conn.execute(
        "INSERT INTO corrections
         (id, field_id, original_prediction, corrected_value, reason_code,
          actor_id, submitted_at, status, version_id, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            correction.id.to_string(),
            correction.field_id,
            snapshot,
            correction.corrected_value,
            correction.reason_code.to_string(),
            correction.actor_id,
            correction.submitted_at,
            status.to_string(),
            version_id,
            Utc::now(),
        ],
    )?;

    Ok(())
}

/// Move a pending correction to its final disposition.
pub fn finalize_correction(
    conn: &Connection,
    id: &Uuid,
    status: CorrectionStatus,
    version_id: Option<i64>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE corrections SET status = ?1, version_id = ?2 WHERE id = ?3",
        params![status.to_string(), version_id, id.to_string()],
    )?;
    Ok(())
}

/// All logged corrections for a field, oldest first.
pub fn corrections_for_field(
    conn: &Connection,
    field_id: &str,
) -> Result<Vec<LoggedCorrection>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, field_id, original_prediction, corrected_value, reason_code,
                actor_id, submitted_at, status, version_id, recorded_at
         FROM corrections
         WHERE field_id = ?1
         ORDER BY submitted_at ASC, recorded_at ASC",
    )?;

    let rows = stmt.query_map(params![field_id], row_to_logged)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(parse_row(row?)?);
    }
    Ok(entries)
}

// ── Row mapping ─────────────────────────────────────────────

struct LogRow {
    id: String,
    field_id: String,
    original_prediction: String,
    corrected_value: String,
    reason_code: String,
    actor_id: String,
    submitted_at: DateTime<Utc>,
    status: String,
    version_id: Option<i64>,
    recorded_at: DateTime<Utc>,
}

fn row_to_logged(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRow> {
    Ok(LogRow {
        id: row.get(0)?,
        field_id: row.get(1)?,
        original_prediction: row.get(2)?,
        corrected_value: row.get(3)?,
        reason_code: row.get(4)?,
        actor_id: row.get(5)?,
        submitted_at: row.get(6)?,
        status: row.get(7)?,
        version_id: row.get(8)?,
        recorded_at: row.get(9)?,
    })
}

fn parse_row(row: LogRow) -> Result<LoggedCorrection, DatabaseError> {
    let id = Uuid::parse_str(&row.id).map_err(|_| DatabaseError::InvalidEnum {
        field: "id".into(),
        value: row.id.clone(),
    })?;
    let original_prediction: PredictedField = serde_json::from_str(&row.original_prediction)?;
    let reason_code: ReasonCode =
        row.reason_code
            .parse()
            .map_err(|_| DatabaseError::InvalidEnum {
                field: "reason_code".into(),
                value: row.reason_code.clone(),
            })?;
    let status: CorrectionStatus =
        row.status.parse().map_err(|_| DatabaseError::InvalidEnum {
            field: "status".into(),
            value: row.status.clone(),
        })?;

    Ok(LoggedCorrection {
        correction: Correction {
            id,
            field_id: row.field_id,
            original_prediction,
            corrected_value: row.corrected_value,
            reason_code,
            submitted_at: row.submitted_at,
            actor_id: row.actor_id,
        },
        status,
        version_id: row.version_id,
        recorded_at: row.recorded_at,
    })
}
