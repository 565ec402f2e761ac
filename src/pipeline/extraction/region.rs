//! Capture-region geometry and the cropped-text helpers used for provenance.
//!
//! Templates are calibrated in page points with a top-left origin. PDF user
//! space has a bottom-left origin, and the rasteriser works in pixels, so
//! this module owns every conversion between the three.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ExtractionError;
use crate::models::CaptureTemplate;

/// PDF points per inch (standard PDF unit).
pub const POINTS_PER_INCH: f32 = 72.0;

/// Longest cropped-text excerpt kept in provenance.
const SNIPPET_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Rectangle on a concrete page, top-left origin, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Rectangle in PDF user space (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfBounds {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl PageRegion {
    /// Place a template's rectangle on a page of `actual` size. When the
    /// page differs from the calibration page the rectangle scales with it.
    /// The result is clipped to the page.
    pub fn from_template(
        template: &CaptureTemplate,
        actual: PageSize,
    ) -> Result<Self, ExtractionError> {
        if template.width <= 0.0 || template.height <= 0.0 {
            return Err(ExtractionError::InvalidRegion(format!(
                "non-positive size {}x{}",
                template.width, template.height
            )));
        }
        let (sx, sy) = if template.page_width_pt > 0.0 && template.page_height_pt > 0.0 {
            (
                actual.width_pt / template.page_width_pt,
                actual.height_pt / template.page_height_pt,
            )
        } else {
            (1.0, 1.0)
        };

        let region = Self {
            x: template.x * sx,
            y: template.y * sy,
            width: template.width * sx,
            height: template.height * sy,
        };
        region.clip_to(actual)
    }

    fn clip_to(self, page: PageSize) -> Result<Self, ExtractionError> {
        let left = self.x.max(0.0);
        let top = self.y.max(0.0);
        let right = (self.x + self.width).min(page.width_pt);
        let bottom = (self.y + self.height).min(page.height_pt);
        if right <= left || bottom <= top {
            return Err(ExtractionError::InvalidRegion(format!(
                "region ({:.1},{:.1} {:.1}x{:.1}) lies outside the {:.1}x{:.1} page",
                self.x, self.y, self.width, self.height, page.width_pt, page.height_pt
            )));
        }
        Ok(Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }

    /// Flip into PDF user space for a page `page_height_pt` tall.
    pub fn to_pdf_bounds(&self, page_height_pt: f32) -> PdfBounds {
        PdfBounds {
            left: self.x,
            bottom: page_height_pt - (self.y + self.height),
            right: self.x + self.width,
            top: page_height_pt - self.y,
        }
    }
}

/// SHA-256 of the cropped text, base64 encoded.
pub fn hash_text(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Whitespace-collapsed excerpt of the cropped text, at most
/// `SNIPPET_MAX_CHARS` characters.
pub fn text_snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SNIPPET_MAX_CHARS {
        collapsed
    } else {
        let mut cut: String = collapsed.chars().take(SNIPPET_MAX_CHARS).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn template(x: f32, y: f32, w: f32, h: f32) -> CaptureTemplate {
        CaptureTemplate {
            sender_key: "acme".into(),
            page_index: 1,
            x,
            y,
            width: w,
            height: h,
            page_width_pt: 612.0,
            page_height_pt: 792.0,
            expected_digits: Some(7),
            updated_at: Utc::now(),
        }
    }

    const LETTER: PageSize = PageSize {
        width_pt: 612.0,
        height_pt: 792.0,
    };

    #[test]
    fn same_size_page_keeps_coordinates() {
        let region = PageRegion::from_template(&template(400.0, 40.0, 150.0, 30.0), LETTER).unwrap();
        assert_eq!(
            region,
            PageRegion {
                x: 400.0,
                y: 40.0,
                width: 150.0,
                height: 30.0
            }
        );
    }

    #[test]
    fn region_scales_with_page() {
        let a4 = PageSize {
            width_pt: 595.0,
            height_pt: 842.0,
        };
        let region = PageRegion::from_template(&template(306.0, 396.0, 61.2, 79.2), a4).unwrap();
        assert!((region.x - 297.5).abs() < 0.01);
        assert!((region.y - 421.0).abs() < 0.01);
        assert!((region.width - 59.5).abs() < 0.01);
        assert!((region.height - 84.2).abs() < 0.01);
    }

    #[test]
    fn region_is_clipped_to_page() {
        let region = PageRegion::from_template(&template(550.0, 770.0, 100.0, 100.0), LETTER).unwrap();
        assert_eq!(region.width, 62.0);
        assert_eq!(region.height, 22.0);
    }

    #[test]
    fn region_outside_page_is_invalid() {
        let err = PageRegion::from_template(&template(700.0, 10.0, 50.0, 50.0), LETTER).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidRegion(_)));
    }

    #[test]
    fn zero_size_region_is_invalid() {
        let err = PageRegion::from_template(&template(10.0, 10.0, 0.0, 50.0), LETTER).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidRegion(_)));
    }

    #[test]
    fn pdf_bounds_flip_vertical_axis() {
        let region = PageRegion {
            x: 400.0,
            y: 40.0,
            width: 150.0,
            height: 30.0,
        };
        let bounds = region.to_pdf_bounds(792.0);
        assert_eq!(bounds.left, 400.0);
        assert_eq!(bounds.right, 550.0);
        assert_eq!(bounds.top, 752.0);
        assert_eq!(bounds.bottom, 722.0);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_text("WO 4521983"), hash_text("WO 4521983"));
        assert_ne!(hash_text("WO 4521983"), hash_text("WO 4521984"));
    }

    #[test]
    fn snippet_collapses_and_truncates() {
        assert_eq!(text_snippet("  Job\n  No:\t4521983 "), "Job No: 4521983");
        let long = "9".repeat(400);
        let snippet = text_snippet(&long);
        assert_eq!(snippet.chars().count(), SNIPPET_MAX_CHARS + 1);
        assert!(snippet.ends_with('…'));
    }
}
