//! Read side of the review queue. Resolution goes through
//! [`ReconciliationPipeline::resolve_review`](super::ReconciliationPipeline::resolve_review)
//! because it re-enters identity resolution and the decision rules.

use rusqlite::Connection;
use uuid::Uuid;

use super::ReconcileError;
use crate::db::repository::{count_review_items, get_review_item, list_review_items, ReviewFilter};
use crate::models::ReviewItem;

/// Unresolved items, oldest first, optionally for one sender.
pub fn list_unresolved(
    conn: &Connection,
    sender_key: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<ReviewItem>, ReconcileError> {
    let filter = ReviewFilter {
        sender_key: sender_key.map(|k| k.trim().to_string()),
        limit,
        ..ReviewFilter::unresolved()
    };
    Ok(list_review_items(conn, &filter)?)
}

pub fn get_item(conn: &Connection, id: &Uuid) -> Result<ReviewItem, ReconcileError> {
    get_review_item(conn, id)?.ok_or(ReconcileError::ReviewItemNotFound(*id))
}

pub fn unresolved_count(conn: &Connection) -> Result<i64, ReconcileError> {
    Ok(count_review_items(conn, &ReviewFilter::unresolved())?)
}
