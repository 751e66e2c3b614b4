//! Pipeline driver: discover PDFs, walk them through the page processor,
//! aggregate totals.
//!
//! The driver is deliberately thin — roughly a tenth of the system. All
//! decision logic lives in [`crate::client`] (retry policy) and
//! [`crate::pipeline::process`] (resumable page loop); this module only
//! wires the parts together and keeps score.

use crate::client::OcrClient;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::process::{process_pdf, PdfReport};
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::progress::PipelineProgress;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Aggregate totals for one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// PDFs discovered under the input directory.
    pub pdfs_found: usize,
    /// PDFs that failed to rasterise (zero pages produced).
    pub pdfs_failed: usize,
    /// Pages newly processed in this run.
    pub pages_processed: usize,
    /// Pages skipped because their final file already existed.
    pub pages_skipped: usize,
    /// Pages that failed at some stage.
    pub pages_failed: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl RunSummary {
    fn absorb(&mut self, report: PdfReport) {
        self.pages_processed += report.processed;
        self.pages_skipped += report.skipped;
        self.pages_failed += report.failed;
    }
}

/// Recursively find `*.pdf` files under `input_dir`, sorted lexicographically
/// for a reproducible run order.
///
/// A missing directory is not an error: it logs and returns an empty list,
/// and the run completes with zeros.
pub fn find_pdfs(input_dir: &Path) -> Vec<PathBuf> {
    if !input_dir.is_dir() {
        warn!(dir = %input_dir.display(), "input directory not found");
        return Vec::new();
    }

    let pattern = format!("{}/**/*.pdf", input_dir.display());
    let mut pdfs: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            warn!(dir = %input_dir.display(), error = %e, "invalid glob pattern");
            return Vec::new();
        }
    };
    pdfs.sort();
    pdfs
}

/// A fully wired pipeline: config, API client, rasterizer, and an optional
/// progress observer.
pub struct Pipeline {
    config: PipelineConfig,
    client: OcrClient,
    rasterizer: Arc<dyn Rasterizer>,
    progress: Option<Arc<dyn PipelineProgress>>,
}

impl Pipeline {
    /// Production wiring: HTTP transport and pdfium rasterizer.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let client = OcrClient::new(&config)?;
        let rasterizer = Arc::new(PdfiumRasterizer::new(&config));
        Ok(Self {
            config,
            client,
            rasterizer,
            progress: None,
        })
    }

    /// Wire a pipeline from pre-built parts. This is the injection seam for
    /// tests (fake transport via [`OcrClient::with_transport`], fake
    /// rasterizer) and for callers that need custom middleware.
    pub fn with_parts(
        config: PipelineConfig,
        client: OcrClient,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        Self {
            config,
            client,
            rasterizer,
            progress: None,
        }
    }

    /// Attach a progress observer.
    pub fn with_progress(mut self, progress: Arc<dyn PipelineProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the pipeline over every PDF under the configured input directory.
    ///
    /// One PDF at a time, one page at a time, one API call at a time. A
    /// corrupt PDF or a failed page is logged and counted, never fatal;
    /// `Err` is reserved for setup-level problems.
    pub async fn run(&self, force: bool) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();
        let pdfs = find_pdfs(&self.config.input_dir);

        let mut summary = RunSummary {
            pdfs_found: pdfs.len(),
            ..RunSummary::default()
        };

        if pdfs.is_empty() {
            warn!("no PDFs to process");
            summary.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(summary);
        }

        info!(
            count = pdfs.len(),
            dir = %self.config.input_dir.display(),
            "found PDF files"
        );
        if let Some(ref cb) = self.progress {
            cb.on_run_start(pdfs.len());
        }

        for pdf in &pdfs {
            // Page count is display-only; a failed query just means the
            // observer shows an unknown total until the PDF finishes.
            let total_pages = self.rasterizer.page_count(pdf).await.ok();
            if let Some(ref cb) = self.progress {
                cb.on_pdf_start(pdf, total_pages);
            }

            match process_pdf(
                pdf,
                &self.client,
                self.rasterizer.as_ref(),
                &self.config,
                force,
                self.progress.as_deref(),
            )
            .await
            {
                Ok(report) => {
                    summary.absorb(report);
                    if let Some(ref cb) = self.progress {
                        cb.on_pdf_done(pdf, report.processed);
                    }
                }
                Err(e) => {
                    error!(pdf = %pdf.display(), error = %e, "failed to process PDF");
                    summary.pdfs_failed += 1;
                    if let Some(ref cb) = self.progress {
                        cb.on_pdf_done(pdf, 0);
                    }
                }
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            pdfs = summary.pdfs_found,
            processed = summary.pages_processed,
            skipped = summary.pages_skipped,
            failed = summary.pages_failed,
            duration_ms = summary.duration_ms,
            "pipeline completed"
        );
        if let Some(ref cb) = self.progress {
            cb.on_run_done(summary.pages_processed);
        }

        Ok(summary)
    }
}
