//! Reconciliation entry point.
//!
//! Drives one signed copy through extraction, identity resolution, the
//! decision rules and persistence, and re-enters the same path when a
//! reviewer resolves a queued item.
//!
//! Collaborators are injected so the whole flow runs against mocks in tests.

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{info, info_span, warn};

use super::assets::FsAssetStore;
use super::decision::{decide, Decision, DecisionInput};
use super::identity::IdentityResolver;
use super::legacy::{LegacyStore, NoopLegacyStore, SqliteLegacyStore};
use super::review::get_item;
use super::templates::template_for;
use super::types::{
    normalize_identifier, IdentityResolution, PipelineInput, PipelineOutput, ResolutionRequest,
};
use super::writer::{ApplyOutcome, MatchTarget, NewReview, PersistenceWriter, ReviewClosure};
use super::ReconcileError;
use crate::config::{ReconcileConfig, Thresholds};
use crate::db::repository::{get_signed_document, resolve_review_item, update_review_reason};
use crate::db::DatabaseError;
use crate::models::enums::{ConfidenceLabel, ExtractionMethod, Outcome, ReasonCode, ResolutionState};
use crate::models::{ReviewItem, SignedDocument};
use crate::pipeline::extraction::pdfium::PdfiumReader;
use crate::pipeline::extraction::recognition::HttpRecognizer;
use crate::pipeline::extraction::rescue::LlmRescue;
use crate::pipeline::extraction::{
    label_for, ExtractionOrchestrator, ExtractionRequest, ExtractionResult, ExtractionRun, ExtractionSettings,
};
use crate::pipeline::llm::OllamaClient;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One synchronous reconciliation per call. Holds no per-document state, so
/// a single instance can serve concurrent callers, each with its own
/// connection.
pub struct ReconciliationPipeline {
    orchestrator: ExtractionOrchestrator,
    resolver: IdentityResolver,
    writer: PersistenceWriter,
    thresholds: Thresholds,
}

/// The identifier the decision rules and the writer act on.
struct Effective {
    identifier: Option<String>,
    confidence: f32,
    label: ConfidenceLabel,
    method: ExtractionMethod,
}

impl ReconciliationPipeline {
    pub fn new(orchestrator: ExtractionOrchestrator, resolver: IdentityResolver, writer: PersistenceWriter) -> Self {
        let thresholds = orchestrator.settings().thresholds.clone();
        Self {
            orchestrator,
            resolver,
            writer,
            thresholds,
        }
    }

    /// Production wiring: PDFium text layer, optional recognition and
    /// rescue services, filesystem assets and the legacy export file.
    pub fn from_config(config: &ReconcileConfig) -> Result<Self, ReconcileError> {
        let settings = ExtractionSettings::from(config);
        let mut orchestrator = ExtractionOrchestrator::new(Box::new(PdfiumReader::new()?), settings);

        if let Some(url) = config.recognition_url.as_deref() {
            orchestrator = orchestrator.with_recognition(
                Box::new(PdfiumReader::new()?),
                Box::new(HttpRecognizer::new(url, config.recognition_timeout_secs)?),
            );
        }
        if let Some(url) = config.rescue_url.as_deref() {
            let client = OllamaClient::new(url, config.rescue_timeout_secs)
                .map_err(crate::pipeline::extraction::ExtractionError::from)?;
            orchestrator = orchestrator.with_rescue(Box::new(LlmRescue::new(Box::new(client), &config.rescue_model)));
        }

        let legacy: Arc<dyn LegacyStore + Send + Sync> = match config.legacy_database_path.as_deref() {
            Some(path) => Arc::new(SqliteLegacyStore::new(path)),
            None => Arc::new(NoopLegacyStore),
        };
        let resolver = IdentityResolver::new(
            config.authoritative_lookup_enabled,
            config.thresholds.duplicate_detection,
            Arc::clone(&legacy),
        );
        let writer = PersistenceWriter::new(Arc::new(FsAssetStore::new(&config.asset_dir)?), legacy);

        info!(
            recognition = config.recognition_url.is_some(),
            rescue = config.rescue_url.is_some(),
            legacy_mirror = config.legacy_database_path.is_some(),
            "Reconciliation pipeline ready"
        );
        Ok(Self::new(orchestrator, resolver, writer))
    }

    pub fn writer(&self) -> &PersistenceWriter {
        &self.writer
    }

    /// Reconcile one submitted signed copy.
    ///
    /// Validation and authoritative-store failures are returned as errors.
    /// Everything else (extraction layer failures, legacy lookups and
    /// mirrors, snippet rendering) degrades and is recorded or logged.
    pub fn process(&self, conn: &Connection, input: &PipelineInput) -> Result<PipelineOutput, ReconcileError> {
        let manual = input.validate()?;
        let sender_key = input.sender_key.trim();
        let span = info_span!(
            "reconcile",
            sender_key = %sender_key,
            source = input.source_tag.as_str(),
            page = input.page_index
        );
        let _enter = span.enter();

        let template = template_for(conn, sender_key)?;
        if template.is_none() {
            info!("No capture zone configured for sender");
        }
        let request = ExtractionRequest {
            pdf_bytes: &input.document_bytes,
            page_index: input.page_index,
            sender_key,
            template: template.as_ref(),
        };
        let ExtractionRun {
            result: extraction,
            region_png,
        } = self.orchestrator.run(&request);

        let effective = match manual {
            Some(identifier) => {
                info!(
                    identifier = %identifier,
                    reason = input.manual_reason.as_deref().unwrap_or("-"),
                    "Manual override supplied"
                );
                Effective {
                    identifier: Some(identifier),
                    confidence: 1.0,
                    label: ConfidenceLabel::High,
                    method: ExtractionMethod::ManualOverride,
                }
            }
            None => Effective {
                identifier: extraction.identifier.clone(),
                confidence: extraction.confidence,
                label: label_for(extraction.confidence, &self.thresholds),
                method: extraction.method,
            },
        };

        let identity = effective
            .identifier
            .as_deref()
            .map(|id| self.resolver.resolve(conn, id, effective.confidence))
            .unwrap_or_else(IdentityResolution::not_found);
        let decision = decide(&DecisionInput {
            has_capture_zone: template.is_some(),
            manual_override: input.manual_identifier.is_some(),
            identifier: effective.identifier.as_deref(),
            label: effective.label,
            identity: &identity,
        });

        let output = match decision.outcome {
            Outcome::AlreadyProcessed => already_processed(&effective, &decision, extraction),
            Outcome::Applied | Outcome::NeedsReview => {
                let rendered = match region_png {
                    Some(png) => Ok(Some(png)),
                    None => self.orchestrator.render_snippet(&request),
                };
                let snippet = match rendered {
                    Ok(png) => png,
                    Err(e) => {
                        warn!(error = %e, "Snippet rendering failed, continuing without it");
                        None
                    }
                };
                let document = self.writer.prepare_document(input, snippet.as_deref())?;
                self.persist(conn, &document, &effective, &identity, decision, extraction)?
            }
        };

        info!(
            outcome = output.outcome.as_str(),
            reason = output.reason_code.map_or("-", |r| r.as_str()),
            identifier = output.identifier.as_deref().unwrap_or("-"),
            confidence = output.confidence,
            "Submission reconciled"
        );
        Ok(output)
    }

    fn persist(
        &self,
        conn: &Connection,
        document: &SignedDocument,
        effective: &Effective,
        identity: &IdentityResolution,
        decision: Decision,
        extraction: ExtractionResult,
    ) -> Result<PipelineOutput, ReconcileError> {
        if decision.outcome == Outcome::Applied {
            if let (Some(record), Some(identifier)) = (identity.record.as_ref(), effective.identifier.as_deref()) {
                let target = MatchTarget {
                    record,
                    identifier,
                    method: effective.method,
                    confidence: effective.confidence,
                };
                return match self.writer.apply(conn, document, true, &target, None)? {
                    ApplyOutcome::Applied { work_order_id } => Ok(PipelineOutput {
                        work_order_id: Some(work_order_id),
                        ..document_output(effective, &decision, document, extraction)
                    }),
                    ApplyOutcome::ConstraintBlocked | ApplyOutcome::ReviewClosedElsewhere => {
                        let blocked = Decision {
                            outcome: Outcome::AlreadyProcessed,
                            reason: Some(ReasonCode::MatchConstraintBlocked),
                            label: decision.label,
                        };
                        Ok(already_processed(effective, &blocked, extraction))
                    }
                };
            }
        }

        let reason = decision.reason.unwrap_or(ReasonCode::WorkOrderNotFound);
        let decision = Decision {
            outcome: Outcome::NeedsReview,
            reason: Some(reason),
            label: decision.label,
        };
        let item = self.writer.queue_review(
            conn,
            document,
            &NewReview {
                extraction: &extraction,
                identifier: effective.identifier.as_deref(),
                confidence: effective.confidence,
                label: decision.label,
                reason,
            },
        )?;
        Ok(PipelineOutput {
            review_item_id: Some(item.id),
            ..document_output(effective, &decision, document, extraction)
        })
    }

    /// Resolve a queued item with a reviewer-supplied identifier. The
    /// identifier re-enters identity resolution and the decision rules as a
    /// manual override; it never bypasses the existence check.
    pub fn resolve_review(
        &self,
        conn: &Connection,
        request: &ResolutionRequest,
    ) -> Result<PipelineOutput, ReconcileError> {
        let identifier = normalize_identifier(&request.identifier)?;
        let item = get_item(conn, &request.review_item_id)?;
        if item.sender_key.trim() != request.sender_key.trim() {
            return Err(ReconcileError::SenderMismatch {
                id: item.id,
                expected: item.sender_key,
                given: request.sender_key.clone(),
            });
        }
        if item.resolution_state == ResolutionState::Resolved {
            return Err(ReconcileError::ReviewAlreadyResolved(item.id));
        }

        let span = info_span!("resolve_review", review_item_id = %item.id, sender_key = %item.sender_key);
        let _enter = span.enter();

        let effective = Effective {
            identifier: Some(identifier.clone()),
            confidence: 1.0,
            label: ConfidenceLabel::High,
            method: ExtractionMethod::ManualOverride,
        };
        let identity = self.resolver.resolve(conn, &identifier, effective.confidence);
        let decision = decide(&DecisionInput {
            has_capture_zone: true,
            manual_override: true,
            identifier: Some(&identifier),
            label: effective.label,
            identity: &identity,
        });
        let note = request.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

        let output = match (decision.outcome, identity.record.as_ref()) {
            (Outcome::Applied, Some(record)) => {
                let document = get_signed_document(conn, &item.signed_document_id)?.ok_or_else(|| {
                    DatabaseError::NotFound {
                        entity_type: "SignedDocument".into(),
                        id: item.signed_document_id.to_string(),
                    }
                })?;
                let target = MatchTarget {
                    record,
                    identifier: &identifier,
                    method: ExtractionMethod::ManualOverride,
                    confidence: effective.confidence,
                };
                let closure = ReviewClosure {
                    review_item_id: item.id,
                    note,
                };
                match self.writer.apply(conn, &document, false, &target, Some(&closure))? {
                    ApplyOutcome::Applied { work_order_id } => PipelineOutput {
                        work_order_id: Some(work_order_id),
                        review_item_id: Some(item.id),
                        ..document_output(&effective, &decision, &document, item.extraction.clone())
                    },
                    ApplyOutcome::ReviewClosedElsewhere => {
                        return Err(ReconcileError::ReviewAlreadyResolved(item.id));
                    }
                    ApplyOutcome::ConstraintBlocked => {
                        let blocked = Decision {
                            outcome: Outcome::AlreadyProcessed,
                            reason: Some(ReasonCode::MatchConstraintBlocked),
                            label: decision.label,
                        };
                        self.close_as_processed(conn, &item, &identifier, note, &effective, &blocked)?
                    }
                }
            }
            (Outcome::AlreadyProcessed, _) => {
                self.close_as_processed(conn, &item, &identifier, note, &effective, &decision)?
            }
            _ => {
                let reason = decision.reason.unwrap_or(ReasonCode::WorkOrderNotFound);
                update_review_reason(conn, &item.id, reason, ConfidenceLabel::Blocked, &identifier, note)?;
                self.writer.mirror_review_state(conn, &item.id);
                info!(identifier = %identifier, reason = reason.as_str(), "Resolution rejected, item stays unresolved");
                PipelineOutput {
                    identifier: Some(identifier.clone()),
                    confidence: effective.confidence,
                    confidence_label: ConfidenceLabel::Blocked,
                    outcome: Outcome::NeedsReview,
                    reason_code: Some(reason),
                    message: Some(reason.message().to_string()),
                    method: effective.method,
                    document_ref: Some(item.document_ref.clone()),
                    snippet_ref: item.snippet_ref.clone(),
                    signed_document_id: Some(item.signed_document_id),
                    work_order_id: None,
                    review_item_id: Some(item.id),
                    extraction: item.extraction.clone(),
                }
            }
        };

        info!(
            outcome = output.outcome.as_str(),
            identifier = %identifier,
            "Review resolution handled"
        );
        Ok(output)
    }

    /// The work order already carries a signed copy: close the item with
    /// the reason in the note, write nothing else.
    fn close_as_processed(
        &self,
        conn: &Connection,
        item: &ReviewItem,
        identifier: &str,
        note: Option<&str>,
        effective: &Effective,
        decision: &Decision,
    ) -> Result<PipelineOutput, ReconcileError> {
        let reason = decision.reason.unwrap_or(ReasonCode::AlreadyMatched);
        let note = match note {
            Some(n) => format!("{n} ({})", reason.message()),
            None => reason.message().to_string(),
        };
        let closed = resolve_review_item(conn, &item.id, identifier, Some(&note), &chrono::Utc::now())?;
        if !closed {
            return Err(ReconcileError::ReviewAlreadyResolved(item.id));
        }
        self.writer.mirror_review_state(conn, &item.id);
        Ok(PipelineOutput {
            review_item_id: Some(item.id),
            ..already_processed(effective, decision, item.extraction.clone())
        })
    }
}

// ---------------------------------------------------------------------------
// Output shaping
// ---------------------------------------------------------------------------

/// AlreadyProcessed carries no asset references: nothing was stored.
fn already_processed(effective: &Effective, decision: &Decision, extraction: ExtractionResult) -> PipelineOutput {
    PipelineOutput {
        identifier: effective.identifier.clone(),
        confidence: effective.confidence,
        confidence_label: decision.label,
        outcome: Outcome::AlreadyProcessed,
        reason_code: decision.reason,
        message: decision.reason.map(|r| r.message().to_string()),
        method: effective.method,
        document_ref: None,
        snippet_ref: None,
        signed_document_id: None,
        work_order_id: None,
        review_item_id: None,
        extraction,
    }
}

fn document_output(
    effective: &Effective,
    decision: &Decision,
    document: &SignedDocument,
    extraction: ExtractionResult,
) -> PipelineOutput {
    PipelineOutput {
        identifier: effective.identifier.clone(),
        confidence: effective.confidence,
        confidence_label: decision.label,
        outcome: decision.outcome,
        reason_code: decision.reason,
        message: decision.reason.map(|r| r.message().to_string()),
        method: effective.method,
        document_ref: Some(document.document_ref.clone()),
        snippet_ref: document.snippet_ref.clone(),
        signed_document_id: Some(document.id),
        work_order_id: None,
        review_item_id: None,
        extraction,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
