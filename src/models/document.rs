use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ExtractionMethod, SourceTag};

/// Where a submission came from. Provenance only: none of these fields
/// take part in matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub message_id: Option<String>,
    pub sender_address: Option<String>,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// A stored signed copy. The bytes live in the asset store under `document_ref`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedDocument {
    pub id: Uuid,
    pub sender_key: String,
    pub filename: String,
    pub source_tag: SourceTag,
    pub content_hash: String,
    pub document_ref: String,
    pub snippet_ref: Option<String>,
    pub metadata: SourceMetadata,
    pub received_at: DateTime<Utc>,
}

/// 1:1 link between a signed document and the work order it reconciles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedMatch {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub signed_document_id: Uuid,
    pub identifier: String,
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub matched_at: DateTime<Utc>,
}
