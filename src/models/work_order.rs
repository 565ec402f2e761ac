use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::WorkOrderStatus;

/// A job record as captured at ingestion. Reconciliation only ever touches
/// `status` and the `signed_*` columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Uuid,
    pub identifier: String,
    pub job_reference: String,
    pub status: WorkOrderStatus,
    /// Opaque descriptive payload (customer, site, line items...).
    pub payload: serde_json::Value,
    pub signed_document_ref: Option<String>,
    pub signed_snippet_ref: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a work order is first ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkOrder {
    pub identifier: String,
    pub job_reference: String,
    #[serde(default = "default_status")]
    pub status: WorkOrderStatus,
    #[serde(default = "default_payload")]
    pub payload: serde_json::Value,
}

fn default_status() -> WorkOrderStatus {
    WorkOrderStatus::Open
}

fn default_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl NewWorkOrder {
    pub fn open(identifier: &str, job_reference: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            job_reference: job_reference.to_string(),
            status: WorkOrderStatus::Open,
            payload: default_payload(),
        }
    }
}

/// The targeted update applied when a signed copy is reconciled.
#[derive(Debug, Clone)]
pub struct SignedTransition {
    pub document_ref: String,
    pub snippet_ref: Option<String>,
    pub signed_at: DateTime<Utc>,
}
