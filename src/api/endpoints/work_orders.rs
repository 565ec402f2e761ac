//! Work order ingestion.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::insert_work_order;
use crate::models::{NewWorkOrder, WorkOrder};
use crate::pipeline::reconcile::normalize_identifier;

/// `POST /api/work-orders` — register a job record signed copies can match.
/// A duplicate identifier is a 409.
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(mut payload): Json<NewWorkOrder>,
) -> Result<(StatusCode, Json<WorkOrder>), ApiError> {
    payload.identifier = normalize_identifier(&payload.identifier)?;
    if payload.job_reference.trim().is_empty() {
        return Err(ApiError::BadRequest("job_reference is blank".into()));
    }

    let created = ctx
        .run_blocking(move |conn, _| Ok(insert_work_order(conn, &payload)?))
        .await?;
    tracing::info!(
        work_order_id = %created.id,
        identifier = %created.identifier,
        "Work order ingested"
    );
    Ok((StatusCode::CREATED, Json(created)))
}
