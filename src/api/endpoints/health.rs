//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::reconcile::review::unresolved_count;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub unresolved_reviews: i64,
}

/// `GET /api/health` — also proves the database is reachable.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let unresolved_reviews = ctx.run_blocking(|conn, _| Ok(unresolved_count(conn)?)).await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        unresolved_reviews,
    }))
}
