use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_ts, parse_opt_ts, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::WorkOrderStatus;
use crate::models::{NewWorkOrder, SignedTransition, WorkOrder};

const WORK_ORDER_COLUMNS: &str = "id, identifier, job_reference, status, payload,
    signed_document_ref, signed_snippet_ref, signed_at, created_at, updated_at";

struct WorkOrderRow {
    id: String,
    identifier: String,
    job_reference: String,
    status: String,
    payload: String,
    signed_document_ref: Option<String>,
    signed_snippet_ref: Option<String>,
    signed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<WorkOrderRow> {
    Ok(WorkOrderRow {
        id: row.get(0)?,
        identifier: row.get(1)?,
        job_reference: row.get(2)?,
        status: row.get(3)?,
        payload: row.get(4)?,
        signed_document_ref: row.get(5)?,
        signed_snippet_ref: row.get(6)?,
        signed_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn work_order_from_row(row: WorkOrderRow) -> Result<WorkOrder, DatabaseError> {
    Ok(WorkOrder {
        id: parse_uuid(&row.id)?,
        identifier: row.identifier,
        job_reference: row.job_reference,
        status: WorkOrderStatus::from_str(&row.status)?,
        payload: serde_json::from_str(&row.payload)
            .map_err(|e| DatabaseError::InvalidJson(format!("work_orders.payload: {e}")))?,
        signed_document_ref: row.signed_document_ref,
        signed_snippet_ref: row.signed_snippet_ref,
        signed_at: parse_opt_ts(row.signed_at)?,
        created_at: parse_ts(&row.created_at)?,
        updated_at: parse_ts(&row.updated_at)?,
    })
}

/// Ingest a work order. A duplicate identifier surfaces as a unique violation.
pub fn insert_work_order(conn: &Connection, new: &NewWorkOrder) -> Result<WorkOrder, DatabaseError> {
    let now = Utc::now();
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO work_orders (id, identifier, job_reference, status, payload, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id.to_string(),
            new.identifier,
            new.job_reference,
            new.status.as_str(),
            new.payload.to_string(),
            format_ts(&now),
        ],
    )?;

    Ok(WorkOrder {
        id,
        identifier: new.identifier.clone(),
        job_reference: new.job_reference.clone(),
        status: new.status,
        payload: new.payload.clone(),
        signed_document_ref: None,
        signed_snippet_ref: None,
        signed_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_work_order(conn: &Connection, id: &Uuid) -> Result<Option<WorkOrder>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(work_order_from_row).transpose()
}

pub fn find_work_order_by_identifier(
    conn: &Connection,
    identifier: &str,
) -> Result<Option<WorkOrder>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE identifier = ?1"),
            params![identifier],
            read_row,
        )
        .optional()?;
    row.map(work_order_from_row).transpose()
}

/// Targeted reconciliation update: status plus the `signed_*` columns.
/// Identifier, job reference and payload are never written here.
pub fn mark_work_order_signed(
    conn: &Connection,
    id: &Uuid,
    transition: &SignedTransition,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE work_orders
         SET status = ?2, signed_document_ref = ?3, signed_snippet_ref = ?4,
             signed_at = ?5, updated_at = ?5
         WHERE id = ?1",
        params![
            id.to_string(),
            WorkOrderStatus::Signed.as_str(),
            transition.document_ref,
            transition.snippet_ref,
            format_ts(&transition.signed_at),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "WorkOrder".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
