use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ConfidenceLabel, ReasonCode, ResolutionState};
use crate::pipeline::extraction::ExtractionResult;

/// A submission that could not be applied automatically.
///
/// Carries the full extraction (candidates with their snippets, scores and
/// source layers) so a reviewer can adjudicate without re-running anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub sender_key: String,
    pub signed_document_id: Uuid,
    pub document_ref: String,
    pub snippet_ref: Option<String>,
    /// Cropped-region text when available, otherwise the best candidate's line.
    pub raw_text: Option<String>,
    pub extracted_identifier: Option<String>,
    pub confidence: f32,
    pub confidence_label: ConfidenceLabel,
    pub reason_code: ReasonCode,
    pub message: String,
    pub extraction: ExtractionResult,
    pub resolution_state: ResolutionState,
    pub resolved_identifier: Option<String>,
    pub resolver_note: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
