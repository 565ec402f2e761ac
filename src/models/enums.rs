use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(WorkOrderStatus {
    Open => "open",
    InProgress => "in_progress",
    Completed => "completed",
    Signed => "signed",
    Cancelled => "cancelled",
});

str_enum!(SourceTag {
    Upload => "upload",
    MailboxImport => "mailbox_import",
});

str_enum!(ConfidenceLabel {
    High => "high",
    Medium => "medium",
    Low => "low",
    Blocked => "blocked",
});

str_enum!(Outcome {
    Applied => "applied",
    NeedsReview => "needs_review",
    AlreadyProcessed => "already_processed",
});

str_enum!(ReasonCode {
    CaptureZoneNotConfigured => "capture_zone_not_configured",
    NoIdentifier => "no_identifier",
    LowConfidence => "low_confidence",
    WorkOrderNotFound => "work_order_not_found",
    AlreadyMatched => "already_matched",
    AlreadySigned => "already_signed",
    MatchConstraintBlocked => "match_constraint_blocked",
});

str_enum!(ResolutionState {
    Unresolved => "unresolved",
    Resolved => "resolved",
});

str_enum!(ExtractionMethod {
    StructuralText => "structural_text",
    OpticalRecognition => "optical_recognition",
    GenerativeRescue => "generative_rescue",
    ManualOverride => "manual_override",
    Unresolved => "unresolved",
});

str_enum!(RecordSource {
    Authoritative => "authoritative",
    Legacy => "legacy",
});

impl ReasonCode {
    /// Message shown to the reviewer alongside the code.
    pub fn message(&self) -> &'static str {
        match self {
            Self::CaptureZoneNotConfigured => "capture zone not configured",
            Self::NoIdentifier => "no identifier",
            Self::LowConfidence => "low confidence",
            Self::WorkOrderNotFound => "original work order not found",
            Self::AlreadyMatched => "work order already has a signed copy attached",
            Self::AlreadySigned => "work order is already marked signed",
            Self::MatchConstraintBlocked => {
                "a concurrent submission attached a signed copy first"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_through_str() {
        for label in [
            ConfidenceLabel::High,
            ConfidenceLabel::Medium,
            ConfidenceLabel::Low,
            ConfidenceLabel::Blocked,
        ] {
            assert_eq!(ConfidenceLabel::from_str(label.as_str()).unwrap(), label);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = Outcome::from_str("maybe").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_snake_case_strings() {
        let json = serde_json::to_string(&ReasonCode::CaptureZoneNotConfigured).unwrap();
        assert_eq!(json, "\"capture_zone_not_configured\"");
        let json = serde_json::to_string(&Outcome::AlreadyProcessed).unwrap();
        assert_eq!(json, "\"already_processed\"");
    }

    #[test]
    fn not_found_message_matches_reviewer_wording() {
        assert_eq!(
            ReasonCode::WorkOrderNotFound.message(),
            "original work order not found"
        );
    }
}
