//! Legacy export store.
//!
//! Downstream spreadsheets read work-order status and the review queue
//! from a separate SQLite export file. It is advisory: lookups here are a
//! fallback for records not yet in the authoritative store, and every
//! write is a mirror whose failure is logged and ignored by the caller.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::format_ts;
use crate::models::enums::WorkOrderStatus;
use crate::models::{NewWorkOrder, ReviewItem, WorkOrder};

const LEGACY_SCHEMA: &str = include_str!("../../../resources/legacy/001_legacy_export.sql");

#[derive(Error, Debug)]
pub enum LegacyError {
    #[error("Legacy store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Legacy record is invalid: {0}")]
    InvalidRecord(String),

    #[error("Legacy store unavailable: {0}")]
    Unavailable(String),
}

/// A work order as the export knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyWorkOrder {
    pub identifier: String,
    pub job_reference: String,
    pub status: WorkOrderStatus,
    pub payload: serde_json::Value,
    pub signed_document_ref: Option<String>,
}

/// A review queue row as the export knows it. Values are kept as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredReview {
    pub reason_code: String,
    pub confidence_label: String,
    pub extracted_identifier: Option<String>,
    pub resolution_state: String,
    pub resolved_at: Option<String>,
}

pub trait LegacyStore {
    fn find_work_order(&self, identifier: &str) -> Result<Option<LegacyWorkOrder>, LegacyError>;
    /// Mirror a reconciled work order (status, signed asset, timestamp).
    fn mirror_signed(&self, order: &WorkOrder) -> Result<(), LegacyError>;
    fn mirror_review(&self, item: &ReviewItem) -> Result<(), LegacyError>;
}

/// Export file on disk. A connection is opened per call so the store can be
/// shared across threads without holding a handle.
pub struct SqliteLegacyStore {
    path: PathBuf,
}

impl SqliteLegacyStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, LegacyError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LegacyError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch(LEGACY_SCHEMA)?;
        Ok(conn)
    }

    /// Seed a record the way the old intake process did.
    pub fn import_work_order(&self, order: &NewWorkOrder) -> Result<(), LegacyError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO legacy_work_orders (identifier, job_reference, status, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                order.identifier,
                order.job_reference,
                order.status.as_str(),
                order.payload.to_string(),
                format_ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn mirrored_review_count(&self) -> Result<i64, LegacyError> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM legacy_review_queue", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Mirrored queue row as downstream sheets see it.
    pub fn mirrored_review(&self, review_item_id: &Uuid) -> Result<Option<MirroredReview>, LegacyError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT reason_code, confidence_label, extracted_identifier, resolution_state, resolved_at
                 FROM legacy_review_queue WHERE review_item_id = ?1",
                params![review_item_id.to_string()],
                |row| {
                    Ok(MirroredReview {
                        reason_code: row.get(0)?,
                        confidence_label: row.get(1)?,
                        extracted_identifier: row.get(2)?,
                        resolution_state: row.get(3)?,
                        resolved_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

impl LegacyStore for SqliteLegacyStore {
    fn find_work_order(&self, identifier: &str) -> Result<Option<LegacyWorkOrder>, LegacyError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT identifier, job_reference, status, payload, signed_document_ref
                 FROM legacy_work_orders WHERE identifier = ?1",
                params![identifier],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(identifier, job_reference, status, payload, signed_document_ref)| -> Result<LegacyWorkOrder, LegacyError> {
            let status = WorkOrderStatus::from_str(&status)
                .map_err(|e| LegacyError::InvalidRecord(e.to_string()))?;
            let payload = serde_json::from_str(&payload)
                .map_err(|e| LegacyError::InvalidRecord(format!("payload of {identifier}: {e}")))?;
            Ok(LegacyWorkOrder {
                identifier,
                job_reference,
                status,
                payload,
                signed_document_ref,
            })
        })
        .transpose()
    }

    fn mirror_signed(&self, order: &WorkOrder) -> Result<(), LegacyError> {
        let conn = self.connect()?;
        let now = format_ts(&Utc::now());
        conn.execute(
            "INSERT INTO legacy_work_orders (identifier, job_reference, status, payload,
             signed_document_ref, signed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(identifier) DO UPDATE SET
               status = excluded.status,
               signed_document_ref = excluded.signed_document_ref,
               signed_at = excluded.signed_at,
               updated_at = excluded.updated_at",
            params![
                order.identifier,
                order.job_reference,
                order.status.as_str(),
                order.payload.to_string(),
                order.signed_document_ref,
                order.signed_at.as_ref().map(format_ts),
                now,
            ],
        )?;
        Ok(())
    }

    fn mirror_review(&self, item: &ReviewItem) -> Result<(), LegacyError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO legacy_review_queue (review_item_id, sender_key, document_ref,
             extracted_identifier, confidence_label, reason_code, resolution_state, resolved_at,
             mirrored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id.to_string(),
                item.sender_key,
                item.document_ref,
                item.extracted_identifier,
                item.confidence_label.as_str(),
                item.reason_code.as_str(),
                item.resolution_state.as_str(),
                item.resolved_at.as_ref().map(format_ts),
                format_ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }
}

/// Mirroring disabled: never finds anything, accepts every write.
pub struct NoopLegacyStore;

impl LegacyStore for NoopLegacyStore {
    fn find_work_order(&self, _identifier: &str) -> Result<Option<LegacyWorkOrder>, LegacyError> {
        Ok(None)
    }

    fn mirror_signed(&self, _order: &WorkOrder) -> Result<(), LegacyError> {
        Ok(())
    }

    fn mirror_review(&self, _item: &ReviewItem) -> Result<(), LegacyError> {
        Ok(())
    }
}

/// Every call fails, as when the export file is locked or missing.
pub struct FailingLegacyStore;

impl LegacyStore for FailingLegacyStore {
    fn find_work_order(&self, _identifier: &str) -> Result<Option<LegacyWorkOrder>, LegacyError> {
        Err(LegacyError::Unavailable("legacy export offline".into()))
    }

    fn mirror_signed(&self, _order: &WorkOrder) -> Result<(), LegacyError> {
        Err(LegacyError::Unavailable("legacy export offline".into()))
    }

    fn mirror_review(&self, _item: &ReviewItem) -> Result<(), LegacyError> {
        Err(LegacyError::Unavailable("legacy export offline".into()))
    }
}
