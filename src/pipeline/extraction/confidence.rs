use crate::config::Thresholds;
use crate::models::enums::ConfidenceLabel;

/// Bucket a numeric confidence into the label that drives routing.
/// `Blocked` is never produced here; the decision engine forces it.
pub fn label_for(confidence: f32, thresholds: &Thresholds) -> ConfidenceLabel {
    if confidence >= thresholds.high_label {
        ConfidenceLabel::High
    } else if confidence >= thresholds.auto_apply {
        ConfidenceLabel::Medium
    } else {
        ConfidenceLabel::Low
    }
}

/// Clamp into [0, cap]. NaN from a misbehaving service becomes 0.
pub fn cap(confidence: f32, ceiling: f32) -> f32 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, ceiling)
}

/// True when `value` is all ASCII digits and within `tolerance` of `expected` digits.
pub fn digits_within_tolerance(value: &str, expected: u8, tolerance: u8) -> bool {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let len = value.len() as i64;
    (len - expected as i64).abs() <= tolerance as i64
}
