//! Correction pipeline: validate → tier → conflict-resolve → commit.
//!
//! Per-field ordering is enforced with a lazily-built arena of per-field
//! mutexes, so corrections to different fields run fully concurrently
//! while "detect conflict → resolve → append" stays atomic per field.
//! The pipeline is infallible toward the caller: every submitted
//! correction gets a structured receipt, whatever happened to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::batcher::{BatchQueue, BatchSink};
use super::conflict::{self, ConflictResolution};
use super::router::{self, Tier};
use super::validator::{self, Issue, Severity};
use super::{CorrectionReceipt, Disposition};
use crate::config::{ConflictPolicy, EngineConfig, TieringConfig};
use crate::corrections::learning::LearningQueue;
use crate::db::repository::CorrectionStatus;
use crate::models::{ConflictSet, Correction, DocumentContext, VersionSource};
use crate::store::{StoreError, VersionStore};

/// Confidence recorded for versions produced by a human correction.
const CORRECTION_CONFIDENCE: f32 = 1.0;

pub struct CorrectionPipeline {
    store: Arc<VersionStore>,
    context: DocumentContext,
    tiering: TieringConfig,
    policy: ConflictPolicy,
    learning: Arc<LearningQueue>,
    batch_queue: Arc<BatchQueue>,
    field_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CorrectionPipeline {
    pub fn new(
        store: Arc<VersionStore>,
        context: DocumentContext,
        config: &EngineConfig,
        learning: Arc<LearningQueue>,
        batch_queue: Arc<BatchQueue>,
    ) -> Self {
        Self {
            store,
            context,
            tiering: config.tiering.clone(),
            policy: config.conflict_policy,
            learning,
            batch_queue,
            field_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn batch_queue(&self) -> &Arc<BatchQueue> {
        &self.batch_queue
    }

    pub fn learning(&self) -> &Arc<LearningQueue> {
        &self.learning
    }

    /// The per-field mutex, created on first use.
    fn field_lock(&self, field_id: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.field_locks.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(field_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Latest committed values of a field's date-order partners.
    fn sibling_values(&self, field_id: &str) -> HashMap<String, String> {
        let mut values = HashMap::new();
        for (partner_id, _) in self.context.date_partners(field_id) {
            match self.store.latest(partner_id) {
                Ok(Some(version)) => {
                    values.insert(partner_id.to_string(), version.value);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(partner_id, error = %e, "Sibling lookup failed");
                }
            }
        }
        values
    }

    /// Process a submission of one or more corrections.
    ///
    /// Receipts come back in submission order. Same-field corrections in
    /// one submission form a conflict set and are resolved before commit.
    pub fn submit(&self, corrections: Vec<Correction>) -> Vec<CorrectionReceipt> {
        let mut receipts: Vec<(usize, CorrectionReceipt)> = Vec::new();
        let mut accepted: HashMap<String, Vec<(usize, Correction, Vec<Issue>)>> = HashMap::new();

        // Validate everything first; group survivors by field
        for (index, correction) in corrections.into_iter().enumerate() {
            let siblings = self.sibling_values(&correction.field_id);
            let report = validator::validate(&correction, &self.context, &siblings);

            if report.accepted() {
                accepted
                    .entry(correction.field_id.clone())
                    .or_default()
                    .push((index, correction, report.issues));
            } else {
                tracing::info!(
                    field_id = correction.field_id,
                    correction_id = %correction.id,
                    "Correction rejected by validator"
                );
                self.log_or_warn(&correction, CorrectionStatus::Rejected, None);
                receipts.push((
                    index,
                    CorrectionReceipt {
                        correction_id: correction.id,
                        accepted: false,
                        issues: report.issues,
                        tier: None,
                        version_id: None,
                        disposition: Disposition::Rejected,
                    },
                ));
            }
        }

        // Commit per field under that field's lock
        for (field_id, mut group) in accepted {
            let lock = self.field_lock(&field_id);
            let _guard = match lock.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };

            if group.len() >= 2 {
                let mut meta: HashMap<Uuid, (usize, Vec<Issue>)> = HashMap::new();
                let mut members = Vec::new();
                for (index, correction, issues) in group {
                    meta.insert(correction.id, (index, issues));
                    members.push(correction);
                }
                let set = ConflictSet {
                    field_id: field_id.clone(),
                    corrections: members,
                };

                match conflict::resolve(set, self.policy) {
                    ConflictResolution::Unresolved(set) => {
                        for correction in set.corrections {
                            self.log_or_warn(&correction, CorrectionStatus::Unresolved, None);
                            if let Some((index, issues)) = meta.remove(&correction.id) {
                                receipts.push((
                                    index,
                                    CorrectionReceipt {
                                        correction_id: correction.id,
                                        accepted: true,
                                        issues,
                                        tier: None,
                                        version_id: None,
                                        disposition: Disposition::Unresolved,
                                    },
                                ));
                            }
                        }
                    }
                    ConflictResolution::Winner { winner, losers } => {
                        for loser in losers {
                            self.log_or_warn(&loser, CorrectionStatus::Superseded, None);
                            if let Some((index, issues)) = meta.remove(&loser.id) {
                                receipts.push((
                                    index,
                                    CorrectionReceipt {
                                        correction_id: loser.id,
                                        accepted: true,
                                        issues,
                                        tier: None,
                                        version_id: None,
                                        disposition: Disposition::Superseded,
                                    },
                                ));
                            }
                        }
                        if let Some((index, issues)) = meta.remove(&winner.id) {
                            receipts.push((index, self.commit_one(winner, issues)));
                        }
                    }
                }
            } else if let Some((index, correction, issues)) = group.pop() {
                receipts.push((index, self.commit_one(correction, issues)));
            }
        }

        receipts.sort_by_key(|(index, _)| *index);
        receipts.into_iter().map(|(_, receipt)| receipt).collect()
    }

    /// Commit a validated, conflict-free correction according to its tier.
    fn commit_one(&self, correction: Correction, issues: Vec<Issue>) -> CorrectionReceipt {
        let tier = router::route(&self.tiering, &correction);
        match tier {
            Tier::Immediate | Tier::Deferred => {
                match self.store.append(
                    &correction.field_id,
                    &correction.corrected_value,
                    CORRECTION_CONFIDENCE,
                    VersionSource::Correction,
                ) {
                    Ok(version) => {
                        self.log_or_warn(
                            &correction,
                            CorrectionStatus::Applied,
                            Some(version.version_id),
                        );
                        if tier == Tier::Deferred {
                            self.learning.enqueue(&correction);
                        }
                        tracing::info!(
                            field_id = correction.field_id,
                            version_id = version.version_id,
                            tier = ?tier,
                            "Correction committed"
                        );
                        CorrectionReceipt {
                            correction_id: correction.id,
                            accepted: true,
                            issues,
                            tier: Some(tier),
                            version_id: Some(version.version_id),
                            disposition: Disposition::Applied,
                        }
                    }
                    Err(e) => self.storage_failure_receipt(&correction, tier, issues, e),
                }
            }
            Tier::Batched => {
                self.log_or_warn(&correction, CorrectionStatus::Pending, None);
                let queued = self.batch_queue.enqueue(correction.clone());
                tracing::debug!(
                    field_id = correction.field_id,
                    queued,
                    "Correction queued for batch flush"
                );
                CorrectionReceipt {
                    correction_id: correction.id,
                    accepted: true,
                    issues,
                    tier: Some(Tier::Batched),
                    version_id: None,
                    disposition: Disposition::PendingBatch,
                }
            }
        }
    }

    /// Commit a drained batch: group per field, resolve conflicts among
    /// co-resident corrections, finalize log entries.
    pub fn commit_batched(&self, batch: Vec<Correction>) {
        let mut by_field: HashMap<String, Vec<Correction>> = HashMap::new();
        for correction in batch {
            by_field
                .entry(correction.field_id.clone())
                .or_default()
                .push(correction);
        }

        for (field_id, mut group) in by_field {
            let lock = self.field_lock(&field_id);
            let _guard = match lock.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };

            if group.len() >= 2 {
                let set = ConflictSet {
                    field_id: field_id.clone(),
                    corrections: group,
                };
                match conflict::resolve(set, self.policy) {
                    ConflictResolution::Unresolved(set) => {
                        for correction in &set.corrections {
                            self.finalize_or_warn(&correction.id, CorrectionStatus::Unresolved, None);
                        }
                    }
                    ConflictResolution::Winner { winner, losers } => {
                        for loser in &losers {
                            self.finalize_or_warn(&loser.id, CorrectionStatus::Superseded, None);
                        }
                        self.apply_batched_winner(&winner);
                    }
                }
            } else if let Some(correction) = group.pop() {
                self.apply_batched_winner(&correction);
            }
        }
    }

    fn apply_batched_winner(&self, correction: &Correction) {
        match self.store.append(
            &correction.field_id,
            &correction.corrected_value,
            CORRECTION_CONFIDENCE,
            VersionSource::Correction,
        ) {
            Ok(version) => {
                self.finalize_or_warn(
                    &correction.id,
                    CorrectionStatus::Applied,
                    Some(version.version_id),
                );
                tracing::info!(
                    field_id = correction.field_id,
                    version_id = version.version_id,
                    "Batched correction committed"
                );
            }
            Err(e) => {
                tracing::error!(
                    field_id = correction.field_id,
                    correction_id = %correction.id,
                    error = %e,
                    "Batched correction failed to commit"
                );
            }
        }
    }

    fn storage_failure_receipt(
        &self,
        correction: &Correction,
        tier: Tier,
        mut issues: Vec<Issue>,
        error: StoreError,
    ) -> CorrectionReceipt {
        tracing::error!(
            field_id = correction.field_id,
            correction_id = %correction.id,
            error = %error,
            "Correction commit failed"
        );
        issues.push(Issue {
            severity: Severity::Critical,
            code: "STORAGE_FAILURE",
            message: error.to_string(),
        });
        CorrectionReceipt {
            correction_id: correction.id,
            accepted: true,
            issues,
            tier: Some(tier),
            version_id: None,
            disposition: Disposition::Failed,
        }
    }

    fn log_or_warn(
        &self,
        correction: &Correction,
        status: CorrectionStatus,
        version_id: Option<i64>,
    ) {
        if let Err(e) = self.store.log_correction(correction, status, version_id) {
            tracing::error!(
                correction_id = %correction.id,
                error = %e,
                "Failed to write correction log entry"
            );
        }
    }

    fn finalize_or_warn(&self, id: &Uuid, status: CorrectionStatus, version_id: Option<i64>) {
        if let Err(e) = self.store.finalize_correction(id, status, version_id) {
            tracing::error!(correction_id = %id, error = %e, "Failed to finalize correction log entry");
        }
    }
}

impl BatchSink for CorrectionPipeline {
    fn commit_batch(&self, corrections: Vec<Correction>) {
        self.commit_batched(corrections);
    }
}
