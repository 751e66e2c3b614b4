//! Progress-observer trait for pipeline events.
//!
//! Attach an `Arc<dyn PipelineProgress>` via
//! [`crate::run::Pipeline::with_progress`] to receive events as the pipeline
//! walks PDFs and pages. Progress rendering is a presentation concern, so the
//! library knows nothing about terminals — the CLI forwards these events to
//! an indicatif bar, but a caller could just as well write them to a log or a
//! channel.
//!
//! All methods have default no-op implementations so observers override only
//! what they care about. The trait is `Send + Sync` out of habit more than
//! necessity: the pipeline is strictly sequential, but observers are shared
//! via `Arc` and may be inspected from other threads (tests do).

use std::path::Path;

/// How a page finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Both output files written this run.
    Processed,
    /// Final file already existed; no API call was made.
    Skipped,
    /// Page-level failure; see the log for the cause.
    Failed,
}

/// Called by the pipeline as it processes PDFs and pages.
pub trait PipelineProgress: Send + Sync {
    /// Called once after discovery, before any PDF is opened.
    fn on_run_start(&self, total_pdfs: usize) {
        let _ = total_pdfs;
    }

    /// Called before a PDF is rasterised.
    ///
    /// `total_pages` is `None` when the metadata query failed; the observer
    /// should fall back to an indeterminate display and finalise with the
    /// count passed to [`on_pdf_done`](Self::on_pdf_done).
    fn on_pdf_start(&self, pdf: &Path, total_pages: Option<usize>) {
        let _ = (pdf, total_pages);
    }

    /// Called just before a page's first API call (not for skipped pages).
    fn on_page_start(&self, page_num: usize) {
        let _ = page_num;
    }

    /// Called after each page is resolved, whatever the outcome.
    fn on_page_done(&self, page_num: usize, status: PageStatus) {
        let _ = (page_num, status);
    }

    /// Called after a PDF's last page, with the count newly processed.
    fn on_pdf_done(&self, pdf: &Path, processed: usize) {
        let _ = (pdf, processed);
    }

    /// Called once after the last PDF.
    fn on_run_done(&self, total_processed: usize) {
        let _ = total_processed;
    }
}

/// A no-op observer for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}
