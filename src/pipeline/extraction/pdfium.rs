//! Scanned-page rasterization through PDFium.
//!
//! `Pdfium` is `!Send`, so every call binds its own instance. The dynamic
//! loader keeps the library mapped after the first bind.

use std::io::Cursor;
use std::path::PathBuf;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::NormalizationError;

/// Longest side of a rendered page in pixels.
const MAX_SIDE_PX: u32 = 6000;

const POINTS_PER_INCH: f32 = 72.0;

/// Renderer backed by a dynamically loaded PDFium library.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Binds the library once so callers can fall back early.
    pub fn new() -> Result<Self, NormalizationError> {
        bind().map(|_| Self)
    }
}

fn library_missing(reason: String) -> NormalizationError {
    NormalizationError::PdfRendering { page: 0, reason }
}

/// `PDFIUM_DYNAMIC_LIB_PATH` wins outright. Otherwise the directory of the
/// running binary is tried before the system search path.
fn bind() -> Result<Pdfium, NormalizationError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| library_missing(format!("cannot load PDFium at {path}: {e}")))?;
        debug!(path = %path, "PDFium bound from environment");
        return Ok(Pdfium::new(bindings));
    }

    let beside_binary: Option<PathBuf> = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from));
    if let Some(dir) = beside_binary {
        let candidate = Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => {
                debug!(dir = %dir.display(), "PDFium bound beside binary");
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => debug!(dir = %dir.display(), error = %e, "No PDFium beside binary"),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| library_missing(format!("PDFium not installed (set PDFIUM_DYNAMIC_LIB_PATH): {e}")))
}

fn open<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, NormalizationError> {
    pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("password") || lower.contains("encrypt") {
            NormalizationError::PdfEncrypted
        } else {
            NormalizationError::CorruptInput(format!("unreadable PDF: {message}"))
        }
    })
}

/// Pixel size of a page rendered at some DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderSize {
    width: u32,
    height: u32,
    /// Whether the longest side had to be scaled down to `MAX_SIDE_PX`.
    capped: bool,
}

impl RenderSize {
    fn for_page(width_pt: f32, height_pt: f32, dpi: u32) -> Self {
        let scale = dpi as f32 / POINTS_PER_INCH;
        let width = (width_pt * scale).max(1.0);
        let height = (height_pt * scale).max(1.0);
        let longest = width.max(height);

        if longest <= MAX_SIDE_PX as f32 {
            return Self {
                width: width as u32,
                height: height as u32,
                capped: false,
            };
        }

        let shrink = MAX_SIDE_PX as f32 / longest;
        Self {
            width: ((width * shrink) as u32).clamp(1, MAX_SIDE_PX),
            height: ((height * shrink) as u32).clamp(1, MAX_SIDE_PX),
            capped: true,
        }
    }
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, NormalizationError> {
        let pdfium = bind()?;
        let document = open(&pdfium, pdf_bytes)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, NormalizationError> {
        let page_number = page_index + 1;
        let render_error = |reason: String| NormalizationError::PdfRendering {
            page: page_number,
            reason,
        };

        let pdfium = bind()?;
        let document = open(&pdfium, pdf_bytes)?;
        let pages = document.pages();
        let page = u16::try_from(page_index)
            .ok()
            .and_then(|index| pages.get(index).ok())
            .ok_or_else(|| render_error(format!("no page {page_number} in a {}-page document", pages.len())))?;

        let size = RenderSize::for_page(page.width().value, page.height().value, dpi);
        if size.capped {
            warn!(
                page = page_number,
                width = size.width,
                height = size.height,
                dpi,
                "Oversized page scaled down"
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(size.width as i32)
            .set_maximum_height(size.height as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| render_error(e.to_string()))?;

        let mut png = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| NormalizationError::ImageProcessing(format!("page {page_number} PNG encode: {e}")))?;
        let png = png.into_inner();

        debug!(page = page_number, width = size.width, height = size.height, bytes = png.len(), "Page rasterized");
        Ok(png)
    }
}
