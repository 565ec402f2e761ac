//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::pipeline::reconcile::assets::AssetError;
use crate::pipeline::reconcile::ReconcileError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Validation(msg) => ApiError::BadRequest(msg),
            ReconcileError::ReviewItemNotFound(id) => ApiError::NotFound(format!("Review item {id} not found")),
            ReconcileError::ReviewAlreadyResolved(id) => {
                ApiError::Conflict(format!("Review item {id} is already resolved"))
            }
            e @ ReconcileError::SenderMismatch { .. } => ApiError::Forbidden(e.to_string()),
            ReconcileError::Database(e) => e.into(),
            e @ (ReconcileError::Storage(_) | ReconcileError::Engine(_)) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        if err.is_unique_violation() {
            return ApiError::Conflict("Record already exists".into());
        }
        match err {
            DatabaseError::NotFound { entity_type, id } => ApiError::NotFound(format!("{entity_type} {id} not found")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::NotFound(r) => ApiError::NotFound(format!("Stored asset {r} is missing")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use uuid::Uuid;

    async fn json_of(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_is_400_with_message() {
        let response = ApiError::from(ReconcileError::Validation("identifier is blank".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "identifier is blank");
    }

    #[tokio::test]
    async fn resolved_item_is_409() {
        let response = ApiError::from(ReconcileError::ReviewAlreadyResolved(Uuid::nil())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn sender_mismatch_is_403() {
        let err = ReconcileError::SenderMismatch {
            id: Uuid::nil(),
            expected: "acme".into(),
            given: "globex".into(),
        };
        assert_eq!(ApiError::from(err).into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_of(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn db_not_found_is_404() {
        let err = DatabaseError::NotFound {
            entity_type: "SignedDocument".into(),
            id: "x".into(),
        };
        assert_eq!(ApiError::from(err).into_response().status(), StatusCode::NOT_FOUND);
    }
}
