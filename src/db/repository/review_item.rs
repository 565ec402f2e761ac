use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_ts, parse_opt_ts, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::{ConfidenceLabel, ReasonCode, ResolutionState};
use crate::models::ReviewItem;

const REVIEW_COLUMNS: &str = "id, sender_key, signed_document_id, document_ref, snippet_ref,
    raw_text, extracted_identifier, confidence, confidence_label, reason_code, message,
    extraction, resolution_state, resolved_identifier, resolver_note, resolved_at, created_at";

/// Filter for listing review items. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub state: Option<ResolutionState>,
    pub sender_key: Option<String>,
    pub limit: Option<u32>,
}

impl ReviewFilter {
    pub fn unresolved() -> Self {
        Self {
            state: Some(ResolutionState::Unresolved),
            ..Self::default()
        }
    }
}

struct ReviewRow {
    id: String,
    sender_key: String,
    signed_document_id: String,
    document_ref: String,
    snippet_ref: Option<String>,
    raw_text: Option<String>,
    extracted_identifier: Option<String>,
    confidence: f32,
    confidence_label: String,
    reason_code: String,
    message: String,
    extraction: String,
    resolution_state: String,
    resolved_identifier: Option<String>,
    resolver_note: Option<String>,
    resolved_at: Option<String>,
    created_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        sender_key: row.get(1)?,
        signed_document_id: row.get(2)?,
        document_ref: row.get(3)?,
        snippet_ref: row.get(4)?,
        raw_text: row.get(5)?,
        extracted_identifier: row.get(6)?,
        confidence: row.get(7)?,
        confidence_label: row.get(8)?,
        reason_code: row.get(9)?,
        message: row.get(10)?,
        extraction: row.get(11)?,
        resolution_state: row.get(12)?,
        resolved_identifier: row.get(13)?,
        resolver_note: row.get(14)?,
        resolved_at: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn review_item_from_row(row: ReviewRow) -> Result<ReviewItem, DatabaseError> {
    Ok(ReviewItem {
        id: parse_uuid(&row.id)?,
        sender_key: row.sender_key,
        signed_document_id: parse_uuid(&row.signed_document_id)?,
        document_ref: row.document_ref,
        snippet_ref: row.snippet_ref,
        raw_text: row.raw_text,
        extracted_identifier: row.extracted_identifier,
        confidence: row.confidence,
        confidence_label: ConfidenceLabel::from_str(&row.confidence_label)?,
        reason_code: ReasonCode::from_str(&row.reason_code)?,
        message: row.message,
        extraction: serde_json::from_str(&row.extraction)
            .map_err(|e| DatabaseError::InvalidJson(format!("review_items.extraction: {e}")))?,
        resolution_state: ResolutionState::from_str(&row.resolution_state)?,
        resolved_identifier: row.resolved_identifier,
        resolver_note: row.resolver_note,
        resolved_at: parse_opt_ts(row.resolved_at)?,
        created_at: parse_ts(&row.created_at)?,
    })
}

pub fn insert_review_item(conn: &Connection, item: &ReviewItem) -> Result<(), DatabaseError> {
    let extraction = serde_json::to_string(&item.extraction)
        .map_err(|e| DatabaseError::InvalidJson(e.to_string()))?;
    conn.execute(
        &format!(
            "INSERT INTO review_items ({REVIEW_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            item.id.to_string(),
            item.sender_key,
            item.signed_document_id.to_string(),
            item.document_ref,
            item.snippet_ref,
            item.raw_text,
            item.extracted_identifier,
            item.confidence,
            item.confidence_label.as_str(),
            item.reason_code.as_str(),
            item.message,
            extraction,
            item.resolution_state.as_str(),
            item.resolved_identifier,
            item.resolver_note,
            item.resolved_at.as_ref().map(format_ts),
            format_ts(&item.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_review_item(conn: &Connection, id: &Uuid) -> Result<Option<ReviewItem>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {REVIEW_COLUMNS} FROM review_items WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(review_item_from_row).transpose()
}

/// Oldest first, so the queue is worked in arrival order.
pub fn list_review_items(
    conn: &Connection,
    filter: &ReviewFilter,
) -> Result<Vec<ReviewItem>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVIEW_COLUMNS} FROM review_items
         WHERE (?1 IS NULL OR resolution_state = ?1)
           AND (?2 IS NULL OR sender_key = ?2)
         ORDER BY created_at ASC
         LIMIT ?3"
    ))?;
    let limit = filter.limit.map_or(-1i64, i64::from);
    let rows = stmt.query_map(
        params![
            filter.state.map(|s| s.as_str()),
            filter.sender_key,
            limit
        ],
        read_row,
    )?;

    let mut items = Vec::new();
    for row in rows {
        items.push(review_item_from_row(row?)?);
    }
    Ok(items)
}

pub fn count_review_items(conn: &Connection, filter: &ReviewFilter) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM review_items
         WHERE (?1 IS NULL OR resolution_state = ?1)
           AND (?2 IS NULL OR sender_key = ?2)",
        params![filter.state.map(|s| s.as_str()), filter.sender_key],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Close an unresolved item. Returns false when the item was already
/// resolved (or does not exist), so two reviewers cannot both close it.
pub fn resolve_review_item(
    conn: &Connection,
    id: &Uuid,
    identifier: &str,
    note: Option<&str>,
    resolved_at: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE review_items
         SET resolution_state = 'resolved', resolved_identifier = ?2,
             resolver_note = ?3, resolved_at = ?4
         WHERE id = ?1 AND resolution_state = 'unresolved'",
        params![id.to_string(), identifier, note, format_ts(resolved_at)],
    )?;
    Ok(updated == 1)
}

/// Record a failed resolution attempt. The item stays unresolved with the
/// new reason so the queue shows why the last attempt was rejected.
pub fn update_review_reason(
    conn: &Connection,
    id: &Uuid,
    reason_code: ReasonCode,
    confidence_label: ConfidenceLabel,
    attempted_identifier: &str,
    note: Option<&str>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE review_items
         SET reason_code = ?2, confidence_label = ?3, message = ?4,
             extracted_identifier = ?5, resolver_note = COALESCE(?6, resolver_note)
         WHERE id = ?1 AND resolution_state = 'unresolved'",
        params![
            id.to_string(),
            reason_code.as_str(),
            confidence_label.as_str(),
            reason_code.message(),
            attempted_identifier,
            note,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ReviewItem".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
