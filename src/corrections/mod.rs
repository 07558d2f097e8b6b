//! Correction ingestion: validation, tiering, conflict resolution, and
//! the per-field commit path.

pub mod batcher;
pub mod conflict;
pub mod learning;
pub mod pipeline;
pub mod router;
pub mod validator;

pub use batcher::{BatchFlusher, BatchQueue, BatchSink};
pub use conflict::{resolve, ConflictResolution};
pub use learning::{LearningEntry, LearningQueue};
pub use pipeline::CorrectionPipeline;
pub use router::{route, Tier};
pub use validator::{validate, Issue, Severity, ValidationReport};

use serde::Serialize;
use uuid::Uuid;

/// What finally happened to a submitted correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Committed to the version store.
    Applied,
    /// Queued in the batched tier; commits at the next flush.
    PendingBatch,
    /// Lost a conflict to another correction.
    Superseded,
    /// Failed validation.
    Rejected,
    /// Conflict under the manual policy; a human must decide.
    Unresolved,
    /// Validation passed but the commit itself failed.
    Failed,
}

/// Per-correction result returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionReceipt {
    pub correction_id: Uuid,
    /// Validation verdict: true iff there were no critical issues.
    pub accepted: bool,
    pub issues: Vec<Issue>,
    pub tier: Option<Tier>,
    pub version_id: Option<i64>,
    pub disposition: Disposition,
}
