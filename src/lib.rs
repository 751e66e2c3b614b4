//! # ocrmill
//!
//! Batch-convert directories of PDF documents into structured Markdown using
//! a two-stage LLM pipeline.
//!
//! ## Why this crate?
//!
//! Traditional PDF-to-text tools fail on complex layouts — multi-column
//! text, tables, and scanned pages come out garbled or out of reading
//! order. ocrmill rasterises each page and lets a vision model read it as a
//! human would, then hands the raw extraction to a text model that turns it
//! into clean Markdown. Every page's final output is persisted individually,
//! so interrupted runs resume exactly where they stopped.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input_dir/**/*.pdf
//!  │
//!  ├─ 1. Discover  recursive glob, sorted for reproducible order
//!  ├─ 2. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode    JPEG q95 → base64 data-URI
//!  ├─ 4. Extract   vision model → raw text   → output_raw/X/X_page_N_raw.txt
//!  ├─ 5. Refine    text model → markdown     → output_texts/X/X_page_N.txt
//!  └─ 6. Resume    existing final files are skipped on the next run
//! ```
//!
//! Processing is strictly sequential — one PDF, one page, one API call at a
//! time — and resilient: rate limits and server errors back off and retry,
//! a failed page or a corrupt PDF is logged and skipped, and only
//! setup-level errors (bad configuration) abort a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocrmill::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_file("config/settings.yaml")?;
//!     let summary = Pipeline::new(config)?.run(false).await?;
//!     eprintln!("processed {} new pages", summary.pages_processed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrmill` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocrmill = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ChatTransport, HttpTransport, OcrClient};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{ClientError, PageError, PipelineError};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use progress::{NoopProgress, PageStatus, PipelineProgress};
pub use run::{find_pdfs, Pipeline, RunSummary};
