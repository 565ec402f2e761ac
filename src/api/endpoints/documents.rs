//! Signed document submission and retrieval.
//!
//! `POST /api/documents` runs the full reconciliation pipeline on one
//! signed copy. `GET /api/documents/:id` returns the stored bytes so a
//! reviewer can open the original.

use axum::extract::{Path, State};
use axum::Json;
use base64::Engine;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, StoredDocumentResponse, SubmitDocumentRequest};
use crate::db::repository::get_signed_document;
use crate::pipeline::reconcile::{PipelineInput, PipelineOutput};

/// Largest decoded document accepted (20 MB).
pub const MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

/// `POST /api/documents` — submit a signed copy for reconciliation.
pub async fn submit(
    State(ctx): State<ApiContext>,
    Json(payload): Json<SubmitDocumentRequest>,
) -> Result<Json<PipelineOutput>, ApiError> {
    let document_bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.document_base64.trim())
        .map_err(|e| ApiError::BadRequest(format!("document_base64 is not valid base64: {e}")))?;
    if document_bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ApiError::BadRequest(format!(
            "Document exceeds {} MB",
            MAX_DOCUMENT_BYTES / (1024 * 1024)
        )));
    }

    let input = PipelineInput {
        document_bytes,
        filename: payload.filename,
        page_index: payload.page_index,
        sender_key: payload.sender_key,
        manual_identifier: payload.manual_identifier,
        manual_reason: payload.manual_reason,
        source_tag: payload.source_tag,
        source_metadata: payload.source_metadata,
    };

    let output = ctx
        .run_blocking(move |conn, pipeline| Ok(pipeline.process(conn, &input)?))
        .await?;
    Ok(Json(output))
}

/// `GET /api/documents/:id` — stored document with its snippet, base64-encoded.
pub async fn fetch(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<StoredDocumentResponse>, ApiError> {
    let id = parse_id(&id)?;

    let response = ctx
        .run_blocking(move |conn, pipeline| {
            let doc = get_signed_document(conn, &id)?
                .ok_or_else(|| ApiError::NotFound(format!("Document {id} not found")))?;
            let assets = pipeline.writer().assets();
            let engine = base64::engine::general_purpose::STANDARD;

            let document_base64 = engine.encode(assets.get(&doc.document_ref)?);
            let snippet_base64 = match doc.snippet_ref.as_deref() {
                Some(r) => match assets.get(r) {
                    Ok(bytes) => Some(engine.encode(bytes)),
                    Err(e) => {
                        tracing::warn!(document_id = %id, error = %e, "Snippet missing from asset store");
                        None
                    }
                },
                None => None,
            };

            Ok(StoredDocumentResponse {
                id: doc.id,
                sender_key: doc.sender_key,
                filename: doc.filename,
                source_tag: doc.source_tag,
                content_hash: doc.content_hash,
                document_ref: doc.document_ref,
                received_at: doc.received_at,
                metadata: doc.metadata,
                document_base64,
                snippet_base64,
            })
        })
        .await?;
    Ok(Json(response))
}
