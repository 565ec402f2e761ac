use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, warn};

use super::legacy::LegacyStore;
use super::types::{IdentityResolution, RecordRef};
use crate::db::repository::{find_work_order_by_identifier, has_signed_match};
use crate::db::DatabaseError;
use crate::models::enums::{ReasonCode, RecordSource, WorkOrderStatus};

/// Finds the work order an identifier refers to and whether it is already
/// reconciled. Never fails: store errors degrade to "try the next store"
/// or "no match".
pub struct IdentityResolver {
    authoritative_enabled: bool,
    duplicate_threshold: f32,
    legacy: Arc<dyn LegacyStore + Send + Sync>,
}

impl IdentityResolver {
    pub fn new(
        authoritative_enabled: bool,
        duplicate_threshold: f32,
        legacy: Arc<dyn LegacyStore + Send + Sync>,
    ) -> Self {
        Self {
            authoritative_enabled,
            duplicate_threshold,
            legacy,
        }
    }

    pub fn resolve(&self, conn: &Connection, identifier: &str, confidence: f32) -> IdentityResolution {
        if self.authoritative_enabled {
            match self.lookup_authoritative(conn, identifier, confidence) {
                Ok(Some(resolution)) => return resolution,
                Ok(None) => debug!(identifier, "Not in authoritative store, trying legacy"),
                Err(e) => warn!(identifier, error = %e, "Authoritative lookup failed, falling back to legacy"),
            }
        }

        match self.legacy.find_work_order(identifier) {
            Ok(Some(order)) => {
                let signed = order.status == WorkOrderStatus::Signed
                    && confidence >= self.duplicate_threshold;
                IdentityResolution {
                    exists: true,
                    already_matched: signed,
                    match_reason: signed.then_some(ReasonCode::AlreadySigned),
                    record: Some(RecordRef {
                        work_order_id: None,
                        identifier: order.identifier,
                        job_reference: order.job_reference,
                        status: order.status,
                        payload: order.payload,
                        source: RecordSource::Legacy,
                    }),
                }
            }
            Ok(None) => IdentityResolution::not_found(),
            Err(e) => {
                warn!(identifier, error = %e, "Legacy lookup failed, treating as no match");
                IdentityResolution::not_found()
            }
        }
    }

    fn lookup_authoritative(
        &self,
        conn: &Connection,
        identifier: &str,
        confidence: f32,
    ) -> Result<Option<IdentityResolution>, DatabaseError> {
        let Some(order) = find_work_order_by_identifier(conn, identifier)? else {
            return Ok(None);
        };

        let match_reason = if has_signed_match(conn, &order.id)? {
            Some(ReasonCode::AlreadyMatched)
        } else if order.status == WorkOrderStatus::Signed && confidence >= self.duplicate_threshold {
            Some(ReasonCode::AlreadySigned)
        } else {
            None
        };

        Ok(Some(IdentityResolution {
            exists: true,
            already_matched: match_reason.is_some(),
            match_reason,
            record: Some(RecordRef {
                work_order_id: Some(order.id),
                identifier: order.identifier,
                job_reference: order.job_reference,
                status: order.status,
                payload: order.payload,
                source: RecordSource::Authoritative,
            }),
        }))
    }
}
