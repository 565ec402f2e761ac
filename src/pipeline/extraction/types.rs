use serde::{Deserialize, Serialize};

use super::region::{PageRegion, PageSize};
use super::ExtractionError;
use crate::models::enums::ExtractionMethod;

/// A single identifier hypothesis and the context it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub value: String,
    /// Ranking score in [0, 1]; only comparable within one layer.
    pub score: f32,
    pub source_layer: ExtractionMethod,
    /// The line or region text the value was read from.
    pub snippet: Option<String>,
}

/// How much of the document produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputScope {
    CroppedRegion,
    FullText,
}

/// Why the cascade ended without an accepted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    NoCandidates,
    AmbiguousCandidates,
    ScanQuality,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCandidates => "no candidates",
            Self::AmbiguousCandidates => "ambiguous multiple candidates",
            Self::ScanQuality => "scan quality",
        }
    }
}

/// Audit record of which layers ran, over which input, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub method: ExtractionMethod,
    pub region_used: bool,
    pub region_key: Option<String>,
    /// Layers entered, in order.
    pub pipeline_path: Vec<ExtractionMethod>,
    pub reasons: Vec<String>,
    pub input_scope: InputScope,
    pub cropped_text_snippet: Option<String>,
    pub cropped_text_hash: Option<String>,
}

/// The orchestrator's final answer plus its reasoning trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub identifier: Option<String>,
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub rationale: String,
    /// Accepted value first (when any), alternates after.
    pub candidates: Vec<ExtractionCandidate>,
    pub provenance: Provenance,
    /// Set only when no layer accepted.
    pub termination: Option<Termination>,
}

impl ExtractionResult {
    /// The text a reviewer should see first: cropped text, else the best snippet.
    pub fn reviewer_text(&self) -> Option<String> {
        self.provenance
            .cropped_text_snippet
            .clone()
            .or_else(|| self.candidates.first().and_then(|c| c.snippet.clone()))
    }
}

/// Raw answer from the optical recognition service for one region image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutput {
    pub text: String,
    pub confidence: f32,
}

/// Raw answer from the generative rescue layer, before capping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueAnswer {
    pub identifier: Option<String>,
    pub confidence: f32,
    pub reason: Option<String>,
}

/// Text layer access for one PDF. Page indexes are 0-based.
pub trait PdfTextSource {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    fn page_size(&self, pdf_bytes: &[u8], page: usize) -> Result<PageSize, ExtractionError>;

    fn page_text(&self, pdf_bytes: &[u8], page: usize) -> Result<String, ExtractionError>;

    /// Text whose glyphs fall inside `region` only.
    fn region_text(
        &self,
        pdf_bytes: &[u8],
        page: usize,
        region: &PageRegion,
    ) -> Result<String, ExtractionError>;
}

/// Rasterises a page region to PNG. Only the region is returned.
pub trait RegionRenderer {
    fn render_region(
        &self,
        pdf_bytes: &[u8],
        page: usize,
        region: &PageRegion,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}

/// External optical recognition service.
pub trait RegionRecognizer {
    fn recognize(
        &self,
        image_png: &[u8],
        expected_digits: u8,
    ) -> Result<RecognitionOutput, ExtractionError>;
}

/// Generative model fallback. Receives cropped-region text only.
pub trait IdentifierRescue {
    fn rescue(&self, cropped_text: &str, expected_digits: u8)
        -> Result<RescueAnswer, ExtractionError>;
}
