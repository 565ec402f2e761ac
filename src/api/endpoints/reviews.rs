//! Review queue endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, ResolveReviewBody, ReviewListQuery, ReviewListResponse};
use crate::models::ReviewItem;
use crate::pipeline::reconcile::review::{get_item, list_unresolved, unresolved_count};
use crate::pipeline::reconcile::{PipelineOutput, ResolutionRequest};

/// `GET /api/reviews` — unresolved items, oldest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<ReviewListResponse>, ApiError> {
    let response = ctx
        .run_blocking(move |conn, _| {
            let items = list_unresolved(conn, query.sender_key.as_deref(), query.limit)?;
            let unresolved_count = unresolved_count(conn)?;
            Ok(ReviewListResponse {
                unresolved_count,
                items,
            })
        })
        .await?;
    Ok(Json(response))
}

/// `GET /api/reviews/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<ReviewItem>, ApiError> {
    let id = parse_id(&id)?;
    let item = ctx.run_blocking(move |conn, _| Ok(get_item(conn, &id)?)).await?;
    Ok(Json(item))
}

/// `POST /api/reviews/:id/resolve` — supply the identifier a reviewer read
/// off the document. The identifier goes through the same existence and
/// duplicate checks as an automatic extraction.
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(body): Json<ResolveReviewBody>,
) -> Result<Json<PipelineOutput>, ApiError> {
    let request = ResolutionRequest {
        review_item_id: parse_id(&id)?,
        sender_key: body.sender_key,
        identifier: body.identifier,
        note: body.note,
    };
    let output = ctx
        .run_blocking(move |conn, pipeline| Ok(pipeline.resolve_review(conn, &request)?))
        .await?;
    Ok(Json(output))
}
