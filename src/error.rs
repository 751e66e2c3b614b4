//! Error types for the ocrmill library.
//!
//! Three distinct error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot proceed at all (invalid
//!   configuration, unreadable config file, HTTP client construction).
//!   Returned as `Err(PipelineError)` from [`crate::run::Pipeline::run`].
//!
//! * [`ClientError`] — one API call failed for good (retries exhausted,
//!   non-retriable HTTP status, malformed response body). Never propagated
//!   past the page loop; the page is logged and skipped.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (encoding glitch,
//!   extraction or refinement call failed, output write failed) but all other
//!   pages are fine. Reported through the progress observer and the run
//!   summary, never as an `Err`.
//!
//! The separation mirrors the error policy: no page or PDF failure terminates
//! the process; only discovery/setup failures do.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocrmill library.
///
/// Page-level failures use [`PageError`] and are counted in
/// [`crate::run::RunSummary`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The settings file could not be read or parsed.
    #[error("Failed to load settings from '{path}': {source}")]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF could not be opened or parsed for rasterisation.
    ///
    /// Surfaced per-PDF and swallowed by the driver: the offending document
    /// yields zero pages and the run continues.
    #[error("PDF '{path}' could not be rasterised: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked blocking task etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single API call that ultimately failed.
///
/// Produced by [`crate::client::OcrClient`] after the retry budget is spent
/// or a non-retriable condition is hit. The caller logs it and moves on to
/// the next page.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint answered with a status that retrying cannot fix
    /// (4xx other than 429).
    #[error("Non-retriable HTTP status {status}")]
    NonRetriable { status: u16 },

    /// Every allowed attempt failed with a transient error.
    #[error("Request failed after {attempts} attempts: {detail}")]
    RetriesExhausted { attempts: u32, detail: String },

    /// The HTTP exchange succeeded but the body did not contain the
    /// expected `choices[0].message.content` field.
    #[error("Unexpected response shape: {detail}")]
    ResponseShape { detail: String },
}

/// A non-fatal error for a single page.
///
/// The page loop logs these and continues; the page will be retried on the
/// next run because its final output file was never written.
#[derive(Debug, Error)]
pub enum PageError {
    /// JPEG encoding of the rendered page failed.
    #[error("Page {page}: image encoding failed: {detail}")]
    Encode { page: usize, detail: String },

    /// The vision extraction call failed; nothing was written for this page.
    #[error("Page {page}: extraction failed: {source}")]
    Extract {
        page: usize,
        #[source]
        source: ClientError,
    },

    /// The refinement call failed; the raw file remains on disk so the page
    /// is retried on the next run.
    #[error("Page {page}: refinement failed: {source}")]
    Refine {
        page: usize,
        #[source]
        source: ClientError,
    },

    /// An output file could not be written.
    #[error("Page {page}: failed to write '{path}': {source}")]
    Write {
        page: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PageError {
    /// 1-indexed page number this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Encode { page, .. }
            | PageError::Extract { page, .. }
            | PageError::Refine { page, .. }
            | PageError::Write { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retriable_display_includes_status() {
        let e = ClientError::NonRetriable { status: 400 };
        assert!(e.to_string().contains("400"));
    }

    #[test]
    fn retries_exhausted_display() {
        let e = ClientError::RetriesExhausted {
            attempts: 5,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("5 attempts"), "got: {msg}");
        assert!(msg.contains("503"));
    }

    #[test]
    fn page_error_reports_page_number() {
        let e = PageError::Extract {
            page: 7,
            source: ClientError::NonRetriable { status: 401 },
        };
        assert_eq!(e.page(), 7);
        assert!(e.to_string().contains("Page 7"));
    }

    #[test]
    fn refine_error_chains_client_error() {
        let e = PageError::Refine {
            page: 2,
            source: ClientError::ResponseShape {
                detail: "missing choices".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("refinement failed"), "got: {msg}");
    }
}
