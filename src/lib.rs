//! redline — prediction resilience and correction reconciliation for
//! structured document fields.
//!
//! Predictions flow through an ordered fallback chain of backends, each
//! guarded by a circuit breaker and a global rate/cost governor. Human
//! corrections are validated, tiered by urgency, conflict-resolved per
//! field, and committed to an append-only version store that supports
//! rollback by append.

pub mod api;
pub mod chain;
pub mod config;
pub mod corrections;
pub mod db;
pub mod engine;
pub mod models;
pub mod store;

pub use chain::backends::{HttpBackend, RuleBasedBackend};
pub use chain::{BackendError, CancelFlag, Cancelled, PredictionBackend};
pub use config::{ConflictPolicy, EngineConfig};
pub use corrections::{CorrectionReceipt, Disposition, Tier};
pub use engine::{Engine, EngineError};
pub use models::{
    Correction, DocumentContext, FieldType, FieldVersion, PredictedField, PredictionOutcome,
    PredictionRequest, ReasonCode, VersionSource,
};
pub use store::{StoreError, VersionStore};
