use super::types::IdentityResolution;
use crate::models::enums::{ConfidenceLabel, Outcome, ReasonCode};

/// Everything the rule table looks at.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub has_capture_zone: bool,
    pub manual_override: bool,
    pub identifier: Option<&'a str>,
    pub label: ConfidenceLabel,
    pub identity: &'a IdentityResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub reason: Option<ReasonCode>,
    pub label: ConfidenceLabel,
}

impl Decision {
    fn applied(label: ConfidenceLabel) -> Self {
        Self {
            outcome: Outcome::Applied,
            reason: None,
            label,
        }
    }

    fn review(reason: ReasonCode, label: ConfidenceLabel) -> Self {
        Self {
            outcome: Outcome::NeedsReview,
            reason: Some(reason),
            label,
        }
    }
}

/// Rule table, first match wins:
///
/// 1. no capture zone (and no override) -> review `capture_zone_not_configured`
/// 2. already matched -> `AlreadyProcessed`
/// 3. no identifier, or a low label without override -> review
/// 4. identifier unknown -> review `work_order_not_found`, label `blocked`
/// 5. applied
///
/// A manual override skips rules 1 and 3 but never rule 4.
pub fn decide(input: &DecisionInput<'_>) -> Decision {
    if !input.has_capture_zone && !input.manual_override {
        return Decision::review(ReasonCode::CaptureZoneNotConfigured, input.label);
    }

    if input.identity.already_matched {
        return Decision {
            outcome: Outcome::AlreadyProcessed,
            reason: Some(input.identity.match_reason.unwrap_or(ReasonCode::AlreadyMatched)),
            label: input.label,
        };
    }

    if input.identifier.is_none() {
        return Decision::review(ReasonCode::NoIdentifier, input.label);
    }
    let low = matches!(input.label, ConfidenceLabel::Low | ConfidenceLabel::Blocked);
    if low && !input.manual_override {
        return Decision::review(ReasonCode::LowConfidence, input.label);
    }

    if !input.identity.exists {
        return Decision::review(ReasonCode::WorkOrderNotFound, ConfidenceLabel::Blocked);
    }

    Decision::applied(input.label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{RecordSource, WorkOrderStatus};
    use crate::pipeline::reconcile::types::RecordRef;

    fn found(already_matched: bool) -> IdentityResolution {
        IdentityResolution {
            exists: true,
            already_matched,
            match_reason: already_matched.then_some(ReasonCode::AlreadySigned),
            record: Some(RecordRef {
                work_order_id: None,
                identifier: "4521983".into(),
                job_reference: "J".into(),
                status: WorkOrderStatus::Open,
                payload: serde_json::json!({}),
                source: RecordSource::Authoritative,
            }),
        }
    }

    fn input<'a>(identity: &'a IdentityResolution, label: ConfidenceLabel) -> DecisionInput<'a> {
        DecisionInput {
            has_capture_zone: true,
            manual_override: false,
            identifier: Some("4521983"),
            label,
            identity,
        }
    }

    #[test]
    fn confident_existing_identifier_is_applied() {
        let identity = found(false);
        let d = decide(&input(&identity, ConfidenceLabel::High));
        assert_eq!(d, Decision::applied(ConfidenceLabel::High));
        assert_eq!(decide(&input(&identity, ConfidenceLabel::Medium)).outcome, Outcome::Applied);
    }

    #[test]
    fn missing_capture_zone_wins_over_everything() {
        let identity = found(true);
        let d = decide(&DecisionInput {
            has_capture_zone: false,
            ..input(&identity, ConfidenceLabel::High)
        });
        assert_eq!(d.outcome, Outcome::NeedsReview);
        assert_eq!(d.reason, Some(ReasonCode::CaptureZoneNotConfigured));
    }

    #[test]
    fn already_matched_is_processed_with_sub_code() {
        let identity = found(true);
        let d = decide(&input(&identity, ConfidenceLabel::High));
        assert_eq!(d.outcome, Outcome::AlreadyProcessed);
        assert_eq!(d.reason, Some(ReasonCode::AlreadySigned));
    }

    #[test]
    fn no_identifier_or_low_label_needs_review() {
        let identity = IdentityResolution::not_found();
        let none = decide(&DecisionInput {
            identifier: None,
            ..input(&identity, ConfidenceLabel::Low)
        });
        assert_eq!(none.reason, Some(ReasonCode::NoIdentifier));

        let found = found(false);
        let low = decide(&input(&found, ConfidenceLabel::Low));
        assert_eq!(low.outcome, Outcome::NeedsReview);
        assert_eq!(low.reason, Some(ReasonCode::LowConfidence));
    }

    #[test]
    fn unknown_identifier_is_blocked() {
        let identity = IdentityResolution::not_found();
        let d = decide(&input(&identity, ConfidenceLabel::High));
        assert_eq!(d.reason, Some(ReasonCode::WorkOrderNotFound));
        assert_eq!(d.label, ConfidenceLabel::Blocked);
    }

    #[test]
    fn override_bypasses_confidence_and_zone_but_not_existence() {
        let identity = found(false);
        let d = decide(&DecisionInput {
            has_capture_zone: false,
            manual_override: true,
            ..input(&identity, ConfidenceLabel::Low)
        });
        assert_eq!(d.outcome, Outcome::Applied);

        let missing = IdentityResolution::not_found();
        let d = decide(&DecisionInput {
            manual_override: true,
            ..input(&missing, ConfidenceLabel::High)
        });
        assert_eq!(d.outcome, Outcome::NeedsReview);
        assert_eq!(d.reason, Some(ReasonCode::WorkOrderNotFound));
    }
}
