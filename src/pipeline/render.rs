//! PDF rasterisation: render pages to `DynamicImage` via pdfium.
//!
//! ## Why a trait?
//!
//! The page processor only needs "give me the pages of this PDF" and "how
//! many pages does it have"; hiding pdfium behind [`Rasterizer`] lets tests
//! inject a fake that fabricates images (or fails on demand) without a PDF
//! library in sight.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so the runtime's worker threads never stall during
//! CPU-heavy rendering.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Produces page images and page counts for one PDF at a time.
///
/// Page numbers in the returned tuples are 1-indexed. Implementations may
/// materialise all pages up front (pdfium does) or yield them from a cache;
/// consumers must not assume the count is known before rendering.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Lightweight metadata query: total page count without rasterising.
    ///
    /// Used only for progress display; errors here are tolerated by the
    /// driver (the display falls back to an unknown total).
    async fn page_count(&self, pdf: &Path) -> Result<usize, PipelineError>;

    /// Rasterise every page of the PDF at the configured resolution.
    async fn render_pages(&self, pdf: &Path)
        -> Result<Vec<(usize, DynamicImage)>, PipelineError>;
}

/// pdfium-backed rasterizer.
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, PipelineError> {
        let path = pdf.to_path_buf();
        tokio::task::spawn_blocking(move || page_count_blocking(&path))
            .await
            .map_err(|e| PipelineError::Internal(format!("page-count task panicked: {e}")))?
    }

    async fn render_pages(
        &self,
        pdf: &Path,
    ) -> Result<Vec<(usize, DynamicImage)>, PipelineError> {
        let path = pdf.to_path_buf();
        let dpi = self.dpi;
        let max_pixels = self.max_pixels;

        tokio::task::spawn_blocking(move || render_pages_blocking(&path, dpi, max_pixels))
            .await
            .map_err(|e| PipelineError::Internal(format!("render task panicked: {e}")))?
    }
}

fn load_document<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, PipelineError> {
    pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| PipelineError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

fn page_count_blocking(pdf_path: &PathBuf) -> Result<usize, PipelineError> {
    let pdfium = Pdfium::default();
    let document = load_document(&pdfium, pdf_path)?;
    Ok(document.pages().len() as usize)
}

/// Blocking implementation of full-document rendering.
///
/// The target width scales the page's physical width (PDF points are 1/72
/// inch) by the configured DPI, capped at `max_pixels` on either edge so an
/// oversized page cannot exhaust memory.
fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, PipelineError> {
    let pdfium = Pdfium::default();
    let document = load_document(&pdfium, pdf_path)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;

        let width_px = ((page.width().value / 72.0) * dpi as f32).round() as i32;
        let width_px = width_px.clamp(1, max_pixels as i32);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_maximum_height(max_pixels as i32);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PipelineError::RasterisationFailed {
                page: page_num,
                detail: format!("{e:?}"),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        results.push((page_num, image));
    }

    Ok(results)
}
