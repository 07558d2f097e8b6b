//! `POST /api/predict` — run the prediction fallback chain.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, PredictBody};
use crate::models::{PredictionOutcome, PredictionRequest};

pub async fn predict(
    State(ctx): State<ApiContext>,
    Json(body): Json<PredictBody>,
) -> Result<Json<PredictionOutcome>, ApiError> {
    if body.document_text.trim().is_empty() {
        return Err(ApiError::BadRequest("document_text is empty".into()));
    }

    let request: PredictionRequest = body.into();
    let engine = ctx.engine.clone();

    // The chain blocks on backend calls and backoff sleeps; keep it off
    // the async workers.
    let outcome = tokio::task::spawn_blocking(move || engine.predict(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("prediction task failed: {e}")))?;

    Ok(Json(outcome))
}
