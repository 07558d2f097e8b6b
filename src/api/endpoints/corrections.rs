//! `POST /api/corrections` — submit corrections, singly or in a batch.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, CorrectionsBody, ReceiptsResponse};
use crate::models::Correction;

pub async fn submit(
    State(ctx): State<ApiContext>,
    Json(body): Json<CorrectionsBody>,
) -> Result<Json<ReceiptsResponse>, ApiError> {
    if body.corrections.is_empty() {
        return Err(ApiError::BadRequest("no corrections submitted".into()));
    }

    let corrections: Vec<Correction> = body.corrections.into_iter().map(Into::into).collect();
    let engine = ctx.engine.clone();

    let receipts = tokio::task::spawn_blocking(move || engine.submit_corrections(corrections))
        .await
        .map_err(|e| ApiError::Internal(format!("correction task failed: {e}")))?;

    Ok(Json(ReceiptsResponse { receipts }))
}
