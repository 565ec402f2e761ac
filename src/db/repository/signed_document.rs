use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_ts, parse_opt_ts, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::SourceTag;
use crate::models::{SignedDocument, SourceMetadata};

pub fn insert_signed_document(conn: &Connection, doc: &SignedDocument) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO signed_documents (id, sender_key, filename, source_tag, content_hash,
         document_ref, snippet_ref, message_id, sender_address, subject, source_date, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            doc.id.to_string(),
            doc.sender_key,
            doc.filename,
            doc.source_tag.as_str(),
            doc.content_hash,
            doc.document_ref,
            doc.snippet_ref,
            doc.metadata.message_id,
            doc.metadata.sender_address,
            doc.metadata.subject,
            doc.metadata.date.as_ref().map(format_ts),
            format_ts(&doc.received_at),
        ],
    )?;
    Ok(())
}

pub fn get_signed_document(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<SignedDocument>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, sender_key, filename, source_tag, content_hash, document_ref, snippet_ref,
             message_id, sender_address, subject, source_date, received_at
             FROM signed_documents WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    (
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, Option<String>>(10)?,
                    ),
                    row.get::<_, String>(11)?,
                ))
            },
        )
        .optional()?;

    let Some((id, sender_key, filename, source_tag, content_hash, document_ref, snippet_ref, meta, received_at)) =
        row
    else {
        return Ok(None);
    };
    let (message_id, sender_address, subject, source_date) = meta;

    Ok(Some(SignedDocument {
        id: parse_uuid(&id)?,
        sender_key,
        filename,
        source_tag: SourceTag::from_str(&source_tag)?,
        content_hash,
        document_ref,
        snippet_ref,
        metadata: SourceMetadata {
            message_id,
            sender_address,
            subject,
            date: parse_opt_ts(source_date)?,
        },
        received_at: parse_ts(&received_at)?,
    }))
}
