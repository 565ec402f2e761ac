//! Capture zone provider over the `capture_templates` table.
//!
//! The calibration tool saves through [`save_template`]; the pipeline reads
//! through [`template_for`]. Geometry is validated on save so a bad
//! rectangle is refused at the boundary instead of failing extraction later.

use rusqlite::Connection;

use super::types::MAX_IDENTIFIER_LEN;
use super::ReconcileError;
use crate::db::repository::{get_capture_template, upsert_capture_template};
use crate::models::CaptureTemplate;

/// Slack for rectangles drawn flush with the page edge.
const EDGE_TOLERANCE_PT: f32 = 0.5;

pub fn template_for(conn: &Connection, sender_key: &str) -> Result<Option<CaptureTemplate>, ReconcileError> {
    Ok(get_capture_template(conn, sender_key)?)
}

pub fn save_template(conn: &Connection, template: &CaptureTemplate) -> Result<(), ReconcileError> {
    validate_template(template)?;
    upsert_capture_template(conn, template)?;
    tracing::info!(
        sender_key = %template.sender_key,
        page = template.page_index,
        region = %template.region_key(),
        "Capture template saved"
    );
    Ok(())
}

fn validate_template(t: &CaptureTemplate) -> Result<(), ReconcileError> {
    let invalid = |msg: String| -> Result<(), ReconcileError> { Err(ReconcileError::Validation(msg)) };

    if t.sender_key.trim().is_empty() {
        return invalid("template sender key is blank".into());
    }
    if t.page_index < 1 {
        return invalid("template page index is 1-based".into());
    }
    let dims = [t.x, t.y, t.width, t.height, t.page_width_pt, t.page_height_pt];
    if dims.iter().any(|v| !v.is_finite()) {
        return invalid("template geometry must be finite".into());
    }
    if t.width <= 0.0 || t.height <= 0.0 || t.page_width_pt <= 0.0 || t.page_height_pt <= 0.0 {
        return invalid("template sizes must be positive".into());
    }
    if t.x < 0.0
        || t.y < 0.0
        || t.x + t.width > t.page_width_pt + EDGE_TOLERANCE_PT
        || t.y + t.height > t.page_height_pt + EDGE_TOLERANCE_PT
    {
        return invalid(format!(
            "rectangle {} lies outside a {}x{} page",
            t.region_key(),
            t.page_width_pt,
            t.page_height_pt
        ));
    }
    if let Some(digits) = t.expected_digits {
        if digits == 0 || usize::from(digits) > MAX_IDENTIFIER_LEN {
            return invalid(format!("expected digit count {digits} out of range"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn template() -> CaptureTemplate {
        CaptureTemplate {
            sender_key: "acme".into(),
            page_index: 1,
            x: 400.0,
            y: 40.0,
            width: 150.0,
            height: 30.0,
            page_width_pt: 612.0,
            page_height_pt: 792.0,
            expected_digits: Some(7),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn saved_template_is_provided() {
        let conn = open_memory_database().unwrap();
        assert!(template_for(&conn, "acme").unwrap().is_none());
        save_template(&conn, &template()).unwrap();
        assert_eq!(template_for(&conn, "acme").unwrap().unwrap().expected_digits, Some(7));
    }

    #[test]
    fn bad_geometry_is_refused() {
        let conn = open_memory_database().unwrap();
        let cases: Vec<Box<dyn Fn(&mut CaptureTemplate)>> = vec![
            Box::new(|t| t.sender_key = " ".into()),
            Box::new(|t| t.page_index = 0),
            Box::new(|t| t.width = 0.0),
            Box::new(|t| t.x = 500.0),
            Box::new(|t| t.y = f32::NAN),
            Box::new(|t| t.expected_digits = Some(0)),
        ];
        for mutate in cases {
            let mut t = template();
            mutate(&mut t);
            assert!(matches!(save_template(&conn, &t), Err(ReconcileError::Validation(_))));
        }
        assert!(template_for(&conn, "acme").unwrap().is_none());
    }
}
