use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_ts, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::ExtractionMethod;
use crate::models::SignedMatch;

/// Insert without any prior existence check. A second match for the same
/// work order fails on `idx_signed_matches_work_order`; callers detect it
/// with [`DatabaseError::is_unique_violation`].
pub fn insert_signed_match(conn: &Connection, m: &SignedMatch) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO signed_matches (id, work_order_id, signed_document_id, identifier, method,
         confidence, matched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            m.id.to_string(),
            m.work_order_id.to_string(),
            m.signed_document_id.to_string(),
            m.identifier,
            m.method.as_str(),
            m.confidence,
            format_ts(&m.matched_at),
        ],
    )?;
    Ok(())
}

pub fn find_match_for_work_order(
    conn: &Connection,
    work_order_id: &Uuid,
) -> Result<Option<SignedMatch>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, work_order_id, signed_document_id, identifier, method, confidence, matched_at
             FROM signed_matches WHERE work_order_id = ?1",
            params![work_order_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f32>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, wo, doc, identifier, method, confidence, matched_at)| -> Result<SignedMatch, DatabaseError> {
        Ok(SignedMatch {
            id: parse_uuid(&id)?,
            work_order_id: parse_uuid(&wo)?,
            signed_document_id: parse_uuid(&doc)?,
            identifier,
            method: ExtractionMethod::from_str(&method)?,
            confidence,
            matched_at: parse_ts(&matched_at)?,
        })
    })
    .transpose()
}

pub fn has_signed_match(conn: &Connection, work_order_id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM signed_matches WHERE work_order_id = ?1",
        params![work_order_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_signed_matches(conn: &Connection, work_order_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM signed_matches WHERE work_order_id = ?1",
        params![work_order_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}
