//! Shared types for the HTTP serving layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::corrections::CorrectionReceipt;
use crate::engine::Engine;
use crate::models::{Correction, PredictedField, PredictionRequest, ReasonCode};

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<Engine>,
}

impl ApiContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

// ═══════════════════════════════════════════════════════════
// Request bodies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct PredictBody {
    pub document_text: String,
    #[serde(default)]
    pub document_type_hint: Option<String>,
    #[serde(default)]
    pub requested_fields: Vec<String>,
}

impl From<PredictBody> for PredictionRequest {
    fn from(body: PredictBody) -> Self {
        PredictionRequest {
            document_text: body.document_text,
            document_type_hint: body.document_type_hint,
            requested_fields: body.requested_fields,
        }
    }
}

/// One correction as submitted over the wire. The engine stamps the id
/// and submission time.
#[derive(Debug, Deserialize)]
pub struct CorrectionSubmission {
    pub field_id: String,
    pub original_prediction: PredictedField,
    pub corrected_value: String,
    pub reason_code: ReasonCode,
    pub actor_id: String,
}

impl From<CorrectionSubmission> for Correction {
    fn from(body: CorrectionSubmission) -> Self {
        Correction::new(
            body.field_id,
            body.original_prediction,
            body.corrected_value,
            body.reason_code,
            body.actor_id,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CorrectionsBody {
    pub corrections: Vec<CorrectionSubmission>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RollbackBody {
    #[serde(default)]
    pub target_version_id: Option<i64>,
}

// ═══════════════════════════════════════════════════════════
// Response bodies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct ReceiptsResponse {
    pub receipts: Vec<CorrectionReceipt>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backends: Vec<String>,
    pub pending_batch: usize,
}
