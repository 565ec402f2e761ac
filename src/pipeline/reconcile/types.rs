use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ReconcileError;
use crate::models::enums::{
    ConfidenceLabel, ExtractionMethod, Outcome, ReasonCode, RecordSource, SourceTag,
    WorkOrderStatus,
};
use crate::models::SourceMetadata;
use crate::pipeline::extraction::ExtractionResult;

/// Longest identifier a reviewer or operator may type.
pub const MAX_IDENTIFIER_LEN: usize = 32;

/// One signed copy submitted for reconciliation.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub document_bytes: Vec<u8>,
    pub filename: Option<String>,
    /// 1-based.
    pub page_index: u32,
    pub sender_key: String,
    pub manual_identifier: Option<String>,
    pub manual_reason: Option<String>,
    pub source_tag: SourceTag,
    pub source_metadata: SourceMetadata,
}

impl PipelineInput {
    /// Upload on page 1 with no override; tests and the API start here.
    pub fn upload(sender_key: &str, document_bytes: Vec<u8>) -> Self {
        Self {
            document_bytes,
            filename: None,
            page_index: 1,
            sender_key: sender_key.to_string(),
            manual_identifier: None,
            manual_reason: None,
            source_tag: SourceTag::Upload,
            source_metadata: SourceMetadata::default(),
        }
    }

    /// Reject malformed input before anything is extracted or stored.
    /// Returns the normalised manual identifier, if one was supplied.
    pub fn validate(&self) -> Result<Option<String>, ReconcileError> {
        if self.sender_key.trim().is_empty() {
            return Err(ReconcileError::Validation("sender key is blank".into()));
        }
        if self.document_bytes.is_empty() {
            return Err(ReconcileError::Validation("document is empty".into()));
        }
        if self.page_index < 1 {
            return Err(ReconcileError::Validation("page index is 1-based".into()));
        }
        self.manual_identifier
            .as_deref()
            .map(normalize_identifier)
            .transpose()
    }
}

/// Trim and check a hand-typed identifier: 1 to 32 ASCII digits.
pub fn normalize_identifier(raw: &str) -> Result<String, ReconcileError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ReconcileError::Validation("identifier is blank".into()));
    }
    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(ReconcileError::Validation(format!(
            "identifier longer than {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ReconcileError::Validation(format!(
            "identifier {trimmed:?} must contain digits only"
        )));
    }
    Ok(trimmed.to_string())
}

/// The caller-facing result of a submission or a review resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub identifier: Option<String>,
    pub confidence: f32,
    pub confidence_label: ConfidenceLabel,
    pub outcome: Outcome,
    pub reason_code: Option<ReasonCode>,
    pub message: Option<String>,
    pub method: ExtractionMethod,
    pub document_ref: Option<String>,
    pub snippet_ref: Option<String>,
    pub signed_document_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub review_item_id: Option<Uuid>,
    /// Full extraction, provenance included.
    pub extraction: ExtractionResult,
}

/// Reviewer-supplied answer for a queued item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub review_item_id: Uuid,
    pub sender_key: String,
    pub identifier: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Where a matched work order lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRef {
    /// Set for authoritative records; legacy-only records have none yet.
    pub work_order_id: Option<Uuid>,
    pub identifier: String,
    pub job_reference: String,
    pub status: WorkOrderStatus,
    pub payload: serde_json::Value,
    pub source: RecordSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityResolution {
    pub exists: bool,
    pub already_matched: bool,
    /// `AlreadyMatched` or `AlreadySigned` when `already_matched` is set.
    pub match_reason: Option<ReasonCode>,
    pub record: Option<RecordRef>,
}

impl IdentityResolution {
    pub fn not_found() -> Self {
        Self {
            exists: false,
            already_matched: false,
            match_reason: None,
            record: None,
        }
    }
}
