//! PDF text layer access and region rasterisation via Google PDFium.
//!
//! `PdfiumReader` is stateless (`Send + Sync`). Each operation creates a
//! fresh `Pdfium` instance because the upstream type is `!Send`; the OS
//! caches the library load, so repeat binds are near-free.

use std::io::Cursor;

use image::{GenericImageView, ImageOutputFormat};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::region::{PageRegion, PageSize, POINTS_PER_INCH};
use super::types::{PdfTextSource, RegionRenderer};
use super::ExtractionError;

/// Maximum dimension (width or height) for a rendered page bitmap.
const MAX_DIMENSION_PX: u32 = 4096;

pub struct PdfiumReader;

impl PdfiumReader {
    /// Create a reader, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable, or in `<exe_dir>/lib`
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfRendering {
                page: 0,
                reason: format!("Failed to load PDFium from {path}: {e}"),
            }
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        for dir in [exe_dir.clone(), exe_dir.join("lib")] {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %dir.display(), "Loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings =
        Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!(
                "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
            ),
        })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors, detecting encrypted PDFs.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = format!("{e}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfParsing(format!("Failed to load PDF: {e}"))
    }
}

/// Bitmap size and points-to-pixels factor for rasterising one region.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RegionRaster {
    width_px: u32,
    height_px: u32,
    scale: f32,
}

/// Size the bitmap for the region alone. The dimension guard applies to
/// the region, not the page, so a small zone on a large page keeps the
/// requested DPI.
fn region_raster(region: &PageRegion, dpi: u32) -> RegionRaster {
    let longest = region.width.max(region.height).max(f32::EPSILON);
    let mut scale = dpi.max(1) as f32 / POINTS_PER_INCH;
    if longest * scale > MAX_DIMENSION_PX as f32 {
        scale = MAX_DIMENSION_PX as f32 / longest;
    }
    let to_px = |points: f32| ((points * scale).round() as u32).clamp(1, MAX_DIMENSION_PX);
    RegionRaster {
        width_px: to_px(region.width),
        height_px: to_px(region.height),
        scale,
    }
}

/// Run `f` against one page of the document.
fn with_page<T>(
    pdf_bytes: &[u8],
    page_number: usize,
    f: impl FnOnce(&PdfPage) -> Result<T, ExtractionError>,
) -> Result<T, ExtractionError> {
    let pdfium = load_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(map_load_error)?;
    let pages = document.pages();
    let count = pages.len() as usize;

    let index = u16::try_from(page_number)
        .ok()
        .filter(|_| page_number < count)
        .ok_or(ExtractionError::PageOutOfRange {
            page: page_number + 1,
            count,
        })?;
    let page = pages.get(index).map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;
    f(&page)
}

fn text_error(page: usize, e: PdfiumError) -> ExtractionError {
    ExtractionError::PdfParsing(format!("text layer unavailable on page {}: {e}", page + 1))
}

impl PdfTextSource for PdfiumReader {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn page_size(&self, pdf_bytes: &[u8], page: usize) -> Result<PageSize, ExtractionError> {
        with_page(pdf_bytes, page, |p| {
            Ok(PageSize {
                width_pt: p.width().value,
                height_pt: p.height().value,
            })
        })
    }

    fn page_text(&self, pdf_bytes: &[u8], page: usize) -> Result<String, ExtractionError> {
        with_page(pdf_bytes, page, |p| {
            let text = p.text().map_err(|e| text_error(page, e))?;
            Ok(text.all())
        })
    }

    fn region_text(
        &self,
        pdf_bytes: &[u8],
        page: usize,
        region: &PageRegion,
    ) -> Result<String, ExtractionError> {
        with_page(pdf_bytes, page, |p| {
            let bounds = region.to_pdf_bounds(p.height().value);
            let rect = PdfRect::new_from_values(bounds.bottom, bounds.left, bounds.top, bounds.right);
            let text = p.text().map_err(|e| text_error(page, e))?;
            Ok(text.inside_rect(rect))
        })
    }
}

impl RegionRenderer for PdfiumReader {
    fn render_region(
        &self,
        pdf_bytes: &[u8],
        page: usize,
        region: &PageRegion,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        with_page(pdf_bytes, page, |p| {
            let raster = region_raster(region, dpi);
            let effective_dpi = (raster.scale * POINTS_PER_INCH).round() as u32;
            if effective_dpi < dpi {
                warn!(page = page + 1, dpi, effective_dpi, "Region render capped to {MAX_DIMENSION_PX}px");
            }

            // Shift the region's top-left corner to the bitmap origin, then
            // scale points to pixels. Nothing outside the region is drawn.
            let render_error = |e: PdfiumError| ExtractionError::PdfRendering {
                page: page + 1,
                reason: format!("Rendering failed: {e}"),
            };
            let config = PdfRenderConfig::new()
                .set_fixed_size(raster.width_px as Pixels, raster.height_px as Pixels)
                .scale_page_by_factor(raster.scale)
                .translate(PdfPoints::new(-region.x), PdfPoints::new(-region.y))
                .map_err(render_error)?;
            let bitmap = p.render_with_config(&config).map_err(render_error)?;
            let region_image = bitmap.as_image();
            let (width, height) = region_image.dimensions();

            let mut cursor = Cursor::new(Vec::new());
            region_image
                .write_to(&mut cursor, ImageOutputFormat::Png)
                .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
            let png_bytes = cursor.into_inner();

            debug!(
                page = page + 1,
                region_width = width,
                region_height = height,
                png_size = png_bytes.len(),
                "Rendered capture region to PNG"
            );
            Ok(png_bytes)
        })
    }
}

// ── Test doubles ──────────────────────────────────────────

/// In-memory text layer: one string per page plus optional region text.
pub struct MockPdfText {
    pages: Vec<String>,
    region_text: Option<String>,
    size: PageSize,
}

impl MockPdfText {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            region_text: None,
            size: PageSize {
                width_pt: 612.0,
                height_pt: 792.0,
            },
        }
    }

    /// Text returned for any region query on any page.
    pub fn with_region_text(mut self, text: &str) -> Self {
        self.region_text = Some(text.to_string());
        self
    }

    fn check(&self, page: usize) -> Result<(), ExtractionError> {
        if page >= self.pages.len() {
            return Err(ExtractionError::PageOutOfRange {
                page: page + 1,
                count: self.pages.len(),
            });
        }
        Ok(())
    }
}

impl PdfTextSource for MockPdfText {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.pages.len())
    }

    fn page_size(&self, _pdf_bytes: &[u8], page: usize) -> Result<PageSize, ExtractionError> {
        self.check(page)?;
        Ok(self.size)
    }

    fn page_text(&self, _pdf_bytes: &[u8], page: usize) -> Result<String, ExtractionError> {
        self.check(page)?;
        Ok(self.pages[page].clone())
    }

    fn region_text(
        &self,
        _pdf_bytes: &[u8],
        page: usize,
        _region: &PageRegion,
    ) -> Result<String, ExtractionError> {
        self.check(page)?;
        Ok(self.region_text.clone().unwrap_or_default())
    }
}

/// Renderer returning a minimal PNG for every region.
pub struct MockRegionRenderer;

impl RegionRenderer for MockRegionRenderer {
    fn render_region(
        &self,
        _pdf_bytes: &[u8],
        _page: usize,
        _region: &PageRegion,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        Ok(minimal_png())
    }
}

/// Minimal valid 1x1 white pixel PNG.
pub fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}
