//! `GET /api/health` — engine liveness and backend roster.

use axum::extract::State;
use axum::Json;

use crate::api::types::{ApiContext, HealthResponse};
use crate::config::ENGINE_VERSION;

pub async fn health(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: ENGINE_VERSION,
        backends: ctx
            .engine
            .backend_names()
            .into_iter()
            .map(String::from)
            .collect(),
        pending_batch: ctx.engine.pending_batch_len(),
    })
}
