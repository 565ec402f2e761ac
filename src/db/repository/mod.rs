//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection` (or `Transaction`, which
//! derefs to one) so callers decide transaction boundaries.

mod capture_template;
mod review_item;
mod signed_document;
mod signed_match;
mod work_order;

pub use capture_template::*;
pub use review_item::*;
pub use signed_document::*;
pub use signed_match::*;
pub use work_order::*;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::DatabaseError;

/// Timestamps are stored as RFC 3339 text with microsecond precision.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidTimestamp(format!("{raw}: {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(format!("bad id {raw}: {e}")))
}
