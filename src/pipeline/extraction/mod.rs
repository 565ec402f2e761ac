pub mod types;
pub mod confidence;
pub mod region;
pub mod structural;
pub mod pdfium;
pub mod recognition;
pub mod rescue;
pub mod orchestrator;

pub use types::*;
pub use confidence::*;
pub use region::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Invalid capture region: {0}")]
    InvalidRegion(String),

    #[error("Recognition service unavailable: {0}")]
    RecognitionUnavailable(String),

    #[error("Recognition service timed out after {0}s")]
    RecognitionTimeout(u64),

    #[error("Recognition service returned error (status {status}): {body}")]
    RecognitionFailed { status: u16, body: String },

    #[error("Generative rescue failed: {0}")]
    Rescue(#[from] LlmError),

    #[error("Malformed service response: {0}")]
    MalformedResponse(String),
}
