//! Version store — append-only per-field history with rollback.
//!
//! Nothing here ever deletes or edits a version. Rollback appends a new
//! version whose value copies the target and whose source is `rollback`,
//! so rolling back a rollback is just another append.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use thiserror::Error;

use crate::db::repository::{correction_log, version as version_repo, CorrectionStatus, LoggedCorrection};
use crate::db::DatabaseError;
use crate::models::{Correction, FieldVersion, VersionSource};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Version {version_id} not found for field {field_id}")]
    VersionNotFound { field_id: String, version_id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal lock error")]
    LockPoisoned,
}

/// SQLite-backed store for field versions and the correction log.
///
/// The connection lock serializes raw access; per-field ordering of
/// "resolve then append" sequences is the correction pipeline's job.
pub struct VersionStore {
    conn: Mutex<Connection>,
}

impl VersionStore {
    /// Open (and migrate) a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: Mutex::new(crate::db::open_database(path)?),
        })
    }

    /// Open an in-memory store. Used by tests and throwaway engines.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Mutex::new(crate::db::open_memory_database()?),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Append a new version for a field. Always monotonic, never overwrites.
    pub fn append(
        &self,
        field_id: &str,
        value: &str,
        confidence: f32,
        produced_by: VersionSource,
    ) -> Result<FieldVersion, StoreError> {
        let conn = self.lock()?;
        let version = version_repo::append_version(&conn, field_id, value, confidence, produced_by)?;
        tracing::debug!(
            field_id,
            version_id = version.version_id,
            produced_by = %version.produced_by,
            "Appended field version"
        );
        Ok(version)
    }

    /// Chronological version history for a field.
    ///
    /// A field nobody has ever written is unknown, not empty.
    pub fn history(&self, field_id: &str) -> Result<Vec<FieldVersion>, StoreError> {
        let conn = self.lock()?;
        let versions = version_repo::history(&conn, field_id)?;
        if versions.is_empty() {
            return Err(StoreError::UnknownField(field_id.to_string()));
        }
        Ok(versions)
    }

    /// The current (latest) version of a field, if the field exists.
    pub fn latest(&self, field_id: &str) -> Result<Option<FieldVersion>, StoreError> {
        let conn = self.lock()?;
        Ok(version_repo::latest(&conn, field_id)?)
    }

    /// Roll a field back by appending a copy of an earlier version.
    ///
    /// With no target, rolls back to the version immediately preceding the
    /// current latest. History is never truncated.
    pub fn rollback(
        &self,
        field_id: &str,
        target_version_id: Option<i64>,
    ) -> Result<FieldVersion, StoreError> {
        let conn = self.lock()?;

        let versions = version_repo::history(&conn, field_id)?;
        if versions.is_empty() {
            return Err(StoreError::UnknownField(field_id.to_string()));
        }

        let target = match target_version_id {
            Some(id) => versions
                .iter()
                .find(|v| v.version_id == id)
                .ok_or(StoreError::VersionNotFound {
                    field_id: field_id.to_string(),
                    version_id: id,
                })?,
            None => {
                // The version before the current latest
                if versions.len() < 2 {
                    return Err(StoreError::VersionNotFound {
                        field_id: field_id.to_string(),
                        version_id: versions[versions.len() - 1].version_id - 1,
                    });
                }
                &versions[versions.len() - 2]
            }
        };

        let rolled = version_repo::append_version(
            &conn,
            field_id,
            &target.value,
            target.confidence,
            VersionSource::Rollback,
        )?;

        tracing::info!(
            field_id,
            target_version = target.version_id,
            new_version = rolled.version_id,
            "Rolled field back"
        );

        Ok(rolled)
    }

    // ── Correction log ──────────────────────────────────────

    /// Record a correction with its disposition.
    pub fn log_correction(
        &self,
        correction: &Correction,
        status: CorrectionStatus,
        version_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        correction_log::insert_correction(&conn, correction, status, version_id)?;
        Ok(())
    }

    /// Move a pending (batched) correction to its final disposition.
    pub fn finalize_correction(
        &self,
        id: &uuid::Uuid,
        status: CorrectionStatus,
        version_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        correction_log::finalize_correction(&conn, id, status, version_id)?;
        Ok(())
    }

    /// Audit view: every correction ever submitted for a field.
    pub fn correction_log(&self, field_id: &str) -> Result<Vec<LoggedCorrection>, StoreError> {
        let conn = self.lock()?;
        Ok(correction_log::corrections_for_field(&conn, field_id)?)
    }
}
