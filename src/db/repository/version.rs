//! Row-level operations on the `field_versions` table.
//!
//! Callers serialize access through the version store's connection lock;
//! these functions assume exclusive use of the connection they are given.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{FieldVersion, VersionSource};

/// Append a new version for a field, allocating the next version id.
pub fn append_version(
    conn: &Connection,
    field_id: &str,
    value: &str,
    confidence: f32,
    produced_by: VersionSource,
) -> Result<FieldVersion, DatabaseError> {
    let latest_id: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_id), 0) FROM field_versions WHERE field_id = ?1",
        params![field_id],
        |row| row.get(0),
    )?;

    let version = FieldVersion {
        field_id: field_id.to_string(),
        version_id: latest_id + 1,
        value: value.to_string(),
        confidence,
        produced_by,
        recorded_at: Utc::now(),
        previous_version_id: (latest_id > 0).then_some(latest_id),
    };

    conn.execute(
        "INSERT INTO field_versions
         (field_id, version_id, value, confidence, produced_by, recorded_at, previous_version_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            version.field_id,
            version.version_id,
            version.value,
            version.confidence,
            version.produced_by.to_string(),
            version.recorded_at,
            version.previous_version_id,
        ],
    )?;

    Ok(version)
}

/// All versions of a field in chronological (version id) order.
pub fn history(conn: &Connection, field_id: &str) -> Result<Vec<FieldVersion>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT field_id, version_id, value, confidence, produced_by, recorded_at, previous_version_id
         FROM field_versions
         WHERE field_id = ?1
         ORDER BY version_id ASC",
    )?;

    let rows = stmt.query_map(params![field_id], row_to_version)?;

    let mut versions = Vec::new();
    for row in rows {
        versions.push(parse_row(row?)?);
    }
    Ok(versions)
}

/// The most recent version of a field, if any.
pub fn latest(conn: &Connection, field_id: &str) -> Result<Option<FieldVersion>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT field_id, version_id, value, confidence, produced_by, recorded_at, previous_version_id
             FROM field_versions
             WHERE field_id = ?1
             ORDER BY version_id DESC
             LIMIT 1",
            params![field_id],
            row_to_version,
        )
        .optional()?;

    row.map(parse_row).transpose()
}

/// A specific version of a field, if present.
pub fn find(
    conn: &Connection,
    field_id: &str,
    version_id: i64,
) -> Result<Option<FieldVersion>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT field_id, version_id, value, confidence, produced_by, recorded_at, previous_version_id
             FROM field_versions
             WHERE field_id = ?1 AND version_id = ?2",
            params![field_id, version_id],
            row_to_version,
        )
        .optional()?;

    row.map(parse_row).transpose()
}

// ── Row mapping ─────────────────────────────────────────────

struct VersionRow {
    field_id: String,
    version_id: i64,
    value: String,
    confidence: f64,
    produced_by: String,
    recorded_at: DateTime<Utc>,
    previous_version_id: Option<i64>,
}

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        field_id: row.get(0)?,
        version_id: row.get(1)?,
        value: row.get(2)?,
        confidence: row.get(3)?,
        produced_by: row.get(4)?,
        recorded_at: row.get(5)?,
        previous_version_id: row.get(6)?,
    })
}

fn parse_row(row: VersionRow) -> Result<FieldVersion, DatabaseError> {
    let produced_by: VersionSource =
        row.produced_by
            .parse()
            .map_err(|_| DatabaseError::InvalidEnum {
                field: "produced_by".into(),
                value: row.produced_by.clone(),
            })?;

    Ok(FieldVersion {
        field_id: row.field_id,
        version_id: row.version_id,
        value: row.value,
        confidence: row.confidence as f32,
        produced_by,
        recorded_at: row.recorded_at,
        previous_version_id: row.previous_version_id,
    })
}
