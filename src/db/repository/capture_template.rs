use rusqlite::{params, Connection, OptionalExtension};

use super::{format_ts, parse_ts};
use crate::db::DatabaseError;
use crate::models::CaptureTemplate;

/// Insert or replace the sender's template. Recalibration overwrites.
pub fn upsert_capture_template(conn: &Connection, t: &CaptureTemplate) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO capture_templates (sender_key, page_index, x, y, width, height,
         page_width_pt, page_height_pt, expected_digits, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(sender_key) DO UPDATE SET
           page_index = excluded.page_index, x = excluded.x, y = excluded.y,
           width = excluded.width, height = excluded.height,
           page_width_pt = excluded.page_width_pt, page_height_pt = excluded.page_height_pt,
           expected_digits = excluded.expected_digits, updated_at = excluded.updated_at",
        params![
            t.sender_key,
            t.page_index,
            t.x,
            t.y,
            t.width,
            t.height,
            t.page_width_pt,
            t.page_height_pt,
            t.expected_digits,
            format_ts(&t.updated_at),
        ],
    )?;
    Ok(())
}

struct TemplateRow {
    sender_key: String,
    page_index: u32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    page_width_pt: f32,
    page_height_pt: f32,
    expected_digits: Option<u8>,
    updated_at: String,
}

pub fn get_capture_template(
    conn: &Connection,
    sender_key: &str,
) -> Result<Option<CaptureTemplate>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT sender_key, page_index, x, y, width, height, page_width_pt, page_height_pt,
             expected_digits, updated_at
             FROM capture_templates WHERE sender_key = ?1",
            params![sender_key],
            |row| {
                Ok(TemplateRow {
                    sender_key: row.get(0)?,
                    page_index: row.get(1)?,
                    x: row.get(2)?,
                    y: row.get(3)?,
                    width: row.get(4)?,
                    height: row.get(5)?,
                    page_width_pt: row.get(6)?,
                    page_height_pt: row.get(7)?,
                    expected_digits: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            },
        )
        .optional()?;

    row.map(|r| -> Result<CaptureTemplate, DatabaseError> {
        Ok(CaptureTemplate {
            sender_key: r.sender_key,
            page_index: r.page_index,
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            page_width_pt: r.page_width_pt,
            page_height_pt: r.page_height_pt,
            expected_digits: r.expected_digits,
            updated_at: parse_ts(&r.updated_at)?,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn template(x: f32, digits: Option<u8>) -> CaptureTemplate {
        CaptureTemplate {
            sender_key: "acme".into(),
            page_index: 1,
            x,
            y: 40.0,
            width: 150.0,
            height: 30.0,
            page_width_pt: 612.0,
            page_height_pt: 792.0,
            expected_digits: digits,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unknown_sender_has_no_template() {
        let conn = open_memory_database().unwrap();
        assert!(get_capture_template(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn recalibration_replaces_template() {
        let conn = open_memory_database().unwrap();
        upsert_capture_template(&conn, &template(400.0, Some(7))).unwrap();
        upsert_capture_template(&conn, &template(380.0, None)).unwrap();

        let loaded = get_capture_template(&conn, "acme").unwrap().unwrap();
        assert_eq!(loaded.x, 380.0);
        assert_eq!(loaded.expected_digits, None);
        assert_eq!(loaded.page_index, 1);
    }

    #[test]
    fn zero_width_template_is_rejected_by_schema() {
        let conn = open_memory_database().unwrap();
        let mut bad = template(400.0, Some(7));
        bad.width = 0.0;
        assert!(upsert_capture_template(&conn, &bad).is_err());
    }
}
