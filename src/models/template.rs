use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calibrated capture rectangle for one sender, as persisted by the
/// calibration tool. Coordinates are page points with a top-left origin,
/// relative to a page of `page_width_pt` x `page_height_pt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureTemplate {
    pub sender_key: String,
    /// 1-based page the rectangle was drawn on.
    pub page_index: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    /// Digit count of this sender's work-order identifiers, if calibrated.
    pub expected_digits: Option<u8>,
    pub updated_at: DateTime<Utc>,
}

impl CaptureTemplate {
    /// Stable key recorded in provenance for the region that was used.
    pub fn region_key(&self) -> String {
        format!(
            "{}@p{}:{:.1},{:.1},{:.1}x{:.1}",
            self.sender_key, self.page_index, self.x, self.y, self.width, self.height
        )
    }
}
