//! Field history and rollback endpoints.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, RollbackBody};
use crate::models::FieldVersion;

/// `GET /api/fields/{field_id}/history`
pub async fn history(
    State(ctx): State<ApiContext>,
    Path(field_id): Path<String>,
) -> Result<Json<Vec<FieldVersion>>, ApiError> {
    let engine = ctx.engine.clone();
    let versions = tokio::task::spawn_blocking(move || engine.history(&field_id))
        .await
        .map_err(|e| ApiError::Internal(format!("history task failed: {e}")))??;
    Ok(Json(versions))
}

/// `GET /api/fields/{field_id}/corrections` — audit view of every
/// correction ever submitted for a field, including superseded, rejected,
/// and unresolved entries.
pub async fn corrections_log(
    State(ctx): State<ApiContext>,
    Path(field_id): Path<String>,
) -> Result<Json<Vec<crate::db::repository::LoggedCorrection>>, ApiError> {
    let engine = ctx.engine.clone();
    let entries = tokio::task::spawn_blocking(move || engine.correction_log(&field_id))
        .await
        .map_err(|e| ApiError::Internal(format!("correction log task failed: {e}")))??;
    Ok(Json(entries))
}

/// `POST /api/fields/{field_id}/rollback`
pub async fn rollback(
    State(ctx): State<ApiContext>,
    Path(field_id): Path<String>,
    body: Option<Json<RollbackBody>>,
) -> Result<Json<FieldVersion>, ApiError> {
    let target = body.map(|Json(b)| b.target_version_id).unwrap_or(None);
    let engine = ctx.engine.clone();
    let version = tokio::task::spawn_blocking(move || engine.rollback(&field_id, target))
        .await
        .map_err(|e| ApiError::Internal(format!("rollback task failed: {e}")))??;
    Ok(Json(version))
}
