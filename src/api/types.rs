//! Shared state and request/response bodies for the HTTP layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::db::sqlite::open_database;
use crate::models::enums::SourceTag;
use crate::models::{ReviewItem, SourceMetadata};
use crate::pipeline::reconcile::ReconciliationPipeline;

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared by every handler. Each request opens its own connection inside
/// a blocking task; the pipeline itself is stateless.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<ReconciliationPipeline>,
    pub db_path: Arc<PathBuf>,
}

impl ApiContext {
    pub fn new(pipeline: ReconciliationPipeline, db_path: &Path) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            db_path: Arc::new(db_path.to_path_buf()),
        }
    }

    /// Run blocking database and pipeline work off the async executor.
    pub async fn run_blocking<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &ReconciliationPipeline) -> Result<T, ApiError> + Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_database(&db_path)?;
            work(&conn, &pipeline)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
    }
}

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid ID format".into()))
}

// ═══════════════════════════════════════════════════════════
// Documents
// ═══════════════════════════════════════════════════════════

fn first_page() -> u32 {
    1
}

fn upload_tag() -> SourceTag {
    SourceTag::Upload
}

#[derive(Debug, Deserialize)]
pub struct SubmitDocumentRequest {
    pub sender_key: String,
    /// Standard base64 of the PDF bytes.
    pub document_base64: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "first_page")]
    pub page_index: u32,
    #[serde(default)]
    pub manual_identifier: Option<String>,
    #[serde(default)]
    pub manual_reason: Option<String>,
    #[serde(default = "upload_tag")]
    pub source_tag: SourceTag,
    #[serde(default)]
    pub source_metadata: SourceMetadata,
}

#[derive(Debug, Serialize)]
pub struct StoredDocumentResponse {
    pub id: Uuid,
    pub sender_key: String,
    pub filename: String,
    pub source_tag: SourceTag,
    pub content_hash: String,
    pub document_ref: String,
    pub received_at: DateTime<Utc>,
    pub metadata: SourceMetadata,
    pub document_base64: String,
    pub snippet_base64: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Reviews
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct ReviewListQuery {
    pub sender_key: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ReviewListResponse {
    pub unresolved_count: i64,
    pub items: Vec<ReviewItem>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReviewBody {
    pub sender_key: String,
    pub identifier: String,
    #[serde(default)]
    pub note: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Templates
// ═══════════════════════════════════════════════════════════

/// Rectangle posted by the calibration tool, in top-left-origin page points.
#[derive(Debug, Deserialize)]
pub struct TemplateBody {
    pub page_index: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    #[serde(default)]
    pub expected_digits: Option<u8>,
}
