use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use super::assets::{content_hash, AssetKind, AssetStore};
use super::legacy::LegacyStore;
use super::types::{PipelineInput, RecordRef};
use super::ReconcileError;
use crate::db::repository::{
    find_work_order_by_identifier, get_review_item, get_work_order, insert_review_item, insert_signed_document,
    insert_signed_match, insert_work_order, mark_work_order_signed, resolve_review_item,
};
use crate::db::DatabaseError;
use crate::models::enums::{ConfidenceLabel, ExtractionMethod, ReasonCode, ResolutionState};
use crate::models::{NewWorkOrder, ReviewItem, SignedDocument, SignedMatch, SignedTransition};
use crate::pipeline::extraction::ExtractionResult;

const DEFAULT_FILENAME: &str = "signed-document.pdf";

/// The work order a document is being attached to.
#[derive(Debug, Clone, Copy)]
pub struct MatchTarget<'a> {
    pub record: &'a RecordRef,
    pub identifier: &'a str,
    pub method: ExtractionMethod,
    pub confidence: f32,
}

/// Review item closed in the same transaction as the match.
#[derive(Debug, Clone, Copy)]
pub struct ReviewClosure<'a> {
    pub review_item_id: Uuid,
    pub note: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { work_order_id: Uuid },
    /// Another submission attached a signed copy first; nothing was written.
    ConstraintBlocked,
    /// The review item was resolved by someone else; nothing was written.
    ReviewClosedElsewhere,
}

/// Fields of a new review item that come from the pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct NewReview<'a> {
    pub extraction: &'a ExtractionResult,
    pub identifier: Option<&'a str>,
    pub confidence: f32,
    pub label: ConfidenceLabel,
    pub reason: ReasonCode,
}

/// Authoritative writes first, legacy mirror after, mirror failures logged only.
pub struct PersistenceWriter {
    assets: Arc<dyn AssetStore + Send + Sync>,
    legacy: Arc<dyn LegacyStore + Send + Sync>,
}

impl PersistenceWriter {
    pub fn new(assets: Arc<dyn AssetStore + Send + Sync>, legacy: Arc<dyn LegacyStore + Send + Sync>) -> Self {
        Self { assets, legacy }
    }

    pub fn assets(&self) -> &(dyn AssetStore + Send + Sync) {
        self.assets.as_ref()
    }

    /// Store the blobs and build the document row (not yet inserted).
    /// The document upload is mandatory; the snippet is best-effort.
    pub fn prepare_document(
        &self,
        input: &PipelineInput,
        snippet_png: Option<&[u8]>,
    ) -> Result<SignedDocument, ReconcileError> {
        let document_ref = self.assets.put(AssetKind::Document, &input.document_bytes)?;
        let snippet_ref = snippet_png.and_then(|png| match self.assets.put(AssetKind::Snippet, png) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(sender_key = %input.sender_key, error = %e, "Snippet upload failed, continuing without it");
                None
            }
        });

        Ok(SignedDocument {
            id: Uuid::new_v4(),
            sender_key: input.sender_key.trim().to_string(),
            filename: input
                .filename
                .clone()
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            source_tag: input.source_tag,
            content_hash: content_hash(&input.document_bytes),
            document_ref,
            snippet_ref,
            metadata: input.source_metadata.clone(),
            received_at: Utc::now(),
        })
    }

    /// Attach `document` to the target work order in one IMMEDIATE
    /// transaction. The match insert is not pre-checked: the unique index
    /// on `signed_matches.work_order_id` decides, and a violation rolls the
    /// whole transaction back.
    pub fn apply(
        &self,
        conn: &Connection,
        document: &SignedDocument,
        insert_document: bool,
        target: &MatchTarget<'_>,
        closing: Option<&ReviewClosure<'_>>,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let now = Utc::now();
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

        if insert_document {
            insert_signed_document(&tx, document)?;
        }
        let work_order_id = match target.record.work_order_id {
            Some(id) => id,
            None => materialize(&tx, target.record)?,
        };

        let signed_match = SignedMatch {
            id: Uuid::new_v4(),
            work_order_id,
            signed_document_id: document.id,
            identifier: target.identifier.to_string(),
            method: target.method,
            confidence: target.confidence,
            matched_at: now,
        };
        match insert_signed_match(&tx, &signed_match) {
            Ok(()) => {}
            Err(e) if e.is_unique_violation() => {
                warn!(
                    work_order_id = %work_order_id,
                    identifier = target.identifier,
                    "Signed match blocked by uniqueness constraint"
                );
                return Ok(ApplyOutcome::ConstraintBlocked);
            }
            Err(e) => return Err(e.into()),
        }

        mark_work_order_signed(
            &tx,
            &work_order_id,
            &SignedTransition {
                document_ref: document.document_ref.clone(),
                snippet_ref: document.snippet_ref.clone(),
                signed_at: now,
            },
        )?;

        if let Some(closure) = closing {
            let closed = resolve_review_item(&tx, &closure.review_item_id, target.identifier, closure.note, &now)?;
            if !closed {
                return Ok(ApplyOutcome::ReviewClosedElsewhere);
            }
        }

        tx.commit()?;
        info!(
            work_order_id = %work_order_id,
            document_id = %document.id,
            identifier = target.identifier,
            method = target.method.as_str(),
            "Signed copy applied"
        );

        match get_work_order(conn, &work_order_id) {
            Ok(Some(order)) => {
                if let Err(e) = self.legacy.mirror_signed(&order) {
                    warn!(work_order_id = %work_order_id, error = %e, "Legacy mirror of signed status failed");
                }
            }
            Ok(None) => warn!(work_order_id = %work_order_id, "Applied work order vanished before mirroring"),
            Err(e) => warn!(work_order_id = %work_order_id, error = %e, "Cannot reload work order for mirroring"),
        }
        if let Some(closure) = closing {
            self.mirror_review_state(conn, &closure.review_item_id);
        }

        Ok(ApplyOutcome::Applied { work_order_id })
    }

    /// Persist the document row and a new unresolved review item together,
    /// then mirror the item to the legacy queue.
    pub fn queue_review(
        &self,
        conn: &Connection,
        document: &SignedDocument,
        review: &NewReview<'_>,
    ) -> Result<ReviewItem, ReconcileError> {
        let item = ReviewItem {
            id: Uuid::new_v4(),
            sender_key: document.sender_key.clone(),
            signed_document_id: document.id,
            document_ref: document.document_ref.clone(),
            snippet_ref: document.snippet_ref.clone(),
            raw_text: review.extraction.reviewer_text(),
            extracted_identifier: review.identifier.map(str::to_string),
            confidence: review.confidence,
            confidence_label: review.label,
            reason_code: review.reason,
            message: review.reason.message().to_string(),
            extraction: review.extraction.clone(),
            resolution_state: ResolutionState::Unresolved,
            resolved_identifier: None,
            resolver_note: None,
            resolved_at: None,
            created_at: Utc::now(),
        };

        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        insert_signed_document(&tx, document)?;
        insert_review_item(&tx, &item)?;
        tx.commit()?;

        info!(
            review_item_id = %item.id,
            document_id = %document.id,
            reason = item.reason_code.as_str(),
            "Queued for review"
        );

        if let Err(e) = self.legacy.mirror_review(&item) {
            warn!(review_item_id = %item.id, error = %e, "Legacy mirror of review item failed");
        }
        Ok(item)
    }

    /// Re-mirror a review item after its state changed (resolved, or a
    /// rejected resolution rewrote its reason). Best-effort.
    pub fn mirror_review_state(&self, conn: &Connection, review_item_id: &Uuid) {
        match get_review_item(conn, review_item_id) {
            Ok(Some(item)) => {
                if let Err(e) = self.legacy.mirror_review(&item) {
                    warn!(review_item_id = %review_item_id, error = %e, "Legacy mirror of review item failed");
                }
            }
            Ok(None) => warn!(review_item_id = %review_item_id, "Review item vanished before mirroring"),
            Err(e) => warn!(review_item_id = %review_item_id, error = %e, "Cannot reload review item for mirroring"),
        }
    }
}

/// Copy a legacy-only record into `work_orders` so the match has a row to
/// reference. Runs inside the caller's transaction.
fn materialize(conn: &Connection, record: &RecordRef) -> Result<Uuid, DatabaseError> {
    if let Some(existing) = find_work_order_by_identifier(conn, &record.identifier)? {
        return Ok(existing.id);
    }
    let created = insert_work_order(
        conn,
        &NewWorkOrder {
            identifier: record.identifier.clone(),
            job_reference: record.job_reference.clone(),
            status: record.status,
            payload: record.payload.clone(),
        },
    )?;
    info!(
        work_order_id = %created.id,
        identifier = %record.identifier,
        "Materialized legacy work order"
    );
    Ok(created.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{count_signed_matches, get_signed_document};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{RecordSource, WorkOrderStatus};
    use crate::pipeline::extraction::{InputScope, Provenance};
    use crate::pipeline::reconcile::assets::{FailingAssetStore, FsAssetStore};
    use crate::pipeline::reconcile::legacy::{FailingLegacyStore, NoopLegacyStore};

    fn extraction() -> ExtractionResult {
        ExtractionResult {
            identifier: None,
            method: ExtractionMethod::Unresolved,
            confidence: 0.0,
            rationale: "no candidates".into(),
            candidates: vec![],
            provenance: Provenance {
                method: ExtractionMethod::Unresolved,
                region_used: false,
                region_key: None,
                pipeline_path: vec![ExtractionMethod::StructuralText],
                reasons: vec![],
                input_scope: InputScope::FullText,
                cropped_text_snippet: None,
                cropped_text_hash: None,
            },
            termination: None,
        }
    }

    fn writer(dir: &std::path::Path, legacy: Arc<dyn LegacyStore + Send + Sync>) -> PersistenceWriter {
        PersistenceWriter::new(Arc::new(FsAssetStore::new(dir).unwrap()), legacy)
    }

    fn record(work_order_id: Option<Uuid>, source: RecordSource) -> RecordRef {
        RecordRef {
            work_order_id,
            identifier: "4521983".into(),
            job_reference: "JOB-1".into(),
            status: WorkOrderStatus::Completed,
            payload: serde_json::json!({"site": "north"}),
            source,
        }
    }

    #[test]
    fn apply_then_second_apply_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let w = writer(dir.path(), Arc::new(NoopLegacyStore));
        let wo = insert_work_order(&conn, &NewWorkOrder::open("4521983", "JOB-1")).unwrap();
        let rec = record(Some(wo.id), RecordSource::Authoritative);
        let target = MatchTarget {
            record: &rec,
            identifier: "4521983",
            method: ExtractionMethod::StructuralText,
            confidence: 0.98,
        };

        let first = w.prepare_document(&PipelineInput::upload("acme", b"%PDF one".to_vec()), None).unwrap();
        assert_eq!(
            w.apply(&conn, &first, true, &target, None).unwrap(),
            ApplyOutcome::Applied { work_order_id: wo.id }
        );

        let second = w.prepare_document(&PipelineInput::upload("acme", b"%PDF two".to_vec()), None).unwrap();
        assert_eq!(
            w.apply(&conn, &second, true, &target, None).unwrap(),
            ApplyOutcome::ConstraintBlocked
        );
        assert_eq!(count_signed_matches(&conn, &wo.id).unwrap(), 1);
        // Rolled back with the match.
        assert!(get_signed_document(&conn, &second.id).unwrap().is_none());

        let after = get_work_order(&conn, &wo.id).unwrap().unwrap();
        assert_eq!(after.status, WorkOrderStatus::Signed);
        assert_eq!(after.signed_document_ref.as_deref(), Some(first.document_ref.as_str()));
    }

    #[test]
    fn legacy_record_is_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let w = writer(dir.path(), Arc::new(NoopLegacyStore));
        let rec = record(None, RecordSource::Legacy);
        let doc = w.prepare_document(&PipelineInput::upload("acme", b"%PDF".to_vec()), None).unwrap();

        let outcome = w
            .apply(
                &conn,
                &doc,
                true,
                &MatchTarget {
                    record: &rec,
                    identifier: "4521983",
                    method: ExtractionMethod::StructuralText,
                    confidence: 0.98,
                },
                None,
            )
            .unwrap();

        let ApplyOutcome::Applied { work_order_id } = outcome else {
            panic!("expected applied, got {outcome:?}");
        };
        let wo = find_work_order_by_identifier(&conn, "4521983").unwrap().unwrap();
        assert_eq!(wo.id, work_order_id);
        assert_eq!(wo.job_reference, "JOB-1");
        assert_eq!(wo.payload["site"], "north");
        assert_eq!(wo.status, WorkOrderStatus::Signed);
    }

    #[test]
    fn snippet_failure_is_not_fatal_but_document_failure_is() {
        let dir = tempfile::tempdir().unwrap();
        let input = PipelineInput::upload("acme", b"%PDF".to_vec());

        let no_snippets = PersistenceWriter::new(
            Arc::new(FailingAssetStore::new(FsAssetStore::new(dir.path()).unwrap(), &[AssetKind::Snippet])),
            Arc::new(NoopLegacyStore),
        );
        let doc = no_snippets.prepare_document(&input, Some(&[0x89, 0x50])).unwrap();
        assert!(doc.snippet_ref.is_none());

        let no_documents = PersistenceWriter::new(
            Arc::new(FailingAssetStore::new(FsAssetStore::new(dir.path()).unwrap(), &[AssetKind::Document])),
            Arc::new(NoopLegacyStore),
        );
        assert!(matches!(
            no_documents.prepare_document(&input, None),
            Err(ReconcileError::Storage(_))
        ));
    }

    #[test]
    fn review_is_queued_despite_mirror_failure() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let w = writer(dir.path(), Arc::new(FailingLegacyStore));
        let mut input = PipelineInput::upload("acme", b"%PDF".to_vec());
        input.filename = Some("scan.pdf".into());
        let doc = w.prepare_document(&input, None).unwrap();
        let result = extraction();

        let item = w
            .queue_review(
                &conn,
                &doc,
                &NewReview {
                    extraction: &result,
                    identifier: None,
                    confidence: 0.0,
                    label: ConfidenceLabel::Low,
                    reason: ReasonCode::NoIdentifier,
                },
            )
            .unwrap();

        let loaded = get_review_item(&conn, &item.id).unwrap().unwrap();
        assert_eq!(loaded.reason_code, ReasonCode::NoIdentifier);
        assert_eq!(loaded.message, "no identifier");
        let stored = get_signed_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(stored.filename, "scan.pdf");
        assert_eq!(w.assets().get(&stored.document_ref).unwrap(), b"%PDF");
    }
}
