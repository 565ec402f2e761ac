//! Capture template calibration.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, TemplateBody};
use crate::models::CaptureTemplate;
use crate::pipeline::reconcile::templates::save_template;

/// `PUT /api/templates/:sender_key` — create or replace the sender's capture
/// zone. Takes effect for the next submission.
pub async fn put(
    State(ctx): State<ApiContext>,
    Path(sender_key): Path<String>,
    Json(body): Json<TemplateBody>,
) -> Result<Json<CaptureTemplate>, ApiError> {
    let template = CaptureTemplate {
        sender_key: sender_key.trim().to_string(),
        page_index: body.page_index,
        x: body.x,
        y: body.y,
        width: body.width,
        height: body.height,
        page_width_pt: body.page_width_pt,
        page_height_pt: body.page_height_pt,
        expected_digits: body.expected_digits,
        updated_at: Utc::now(),
    };
    let saved = template.clone();
    ctx.run_blocking(move |conn, _| Ok(save_template(conn, &saved)?))
        .await?;
    Ok(Json(template))
}
