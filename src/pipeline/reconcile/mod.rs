pub mod types;
pub mod assets;
pub mod decision;
pub mod identity;
pub mod legacy;
pub mod writer;
pub mod review;
pub mod templates;
pub mod processor;

pub use types::*;
pub use processor::*;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::pipeline::extraction::ExtractionError;
use assets::AssetError;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Document storage failed: {0}")]
    Storage(#[from] AssetError),

    #[error("Extraction engine unavailable: {0}")]
    Engine(#[from] ExtractionError),

    #[error("Review item not found: {0}")]
    ReviewItemNotFound(Uuid),

    #[error("Review item {0} is already resolved")]
    ReviewAlreadyResolved(Uuid),

    #[error("Review item {id} belongs to sender {expected}, not {given}")]
    SenderMismatch {
        id: Uuid,
        expected: String,
        given: String,
    },
}

impl From<rusqlite::Error> for ReconcileError {
    fn from(e: rusqlite::Error) -> Self {
        ReconcileError::Database(DatabaseError::Sqlite(e))
    }
}
