//! API route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::endpoints::{corrections, fields, health, predict};
use super::types::ApiContext;

/// Build the engine's HTTP router.
pub fn build_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/predict", post(predict::predict))
        .route("/api/corrections", post(corrections::submit))
        .route("/api/fields/:field_id/history", get(fields::history))
        .route("/api/fields/:field_id/corrections", get(fields::corrections_log))
        .route("/api/fields/:field_id/rollback", post(fields::rollback))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
