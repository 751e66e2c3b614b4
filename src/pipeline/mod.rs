//! Pipeline stages for batch PDF-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations (e.g. a different rendering backend, or a fake rasterizer
//! in tests) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ encode ──▶ extract ──▶ raw file ──▶ refine ──▶ final file
//! (pdfium)   (jpeg/b64)  (vision)               (text LLM)
//! ```
//!
//! 1. [`render`]  — rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 2. [`encode`]  — JPEG-encode and base64-wrap each page for the multimodal
//!    request body
//! 3. [`process`] — drive one PDF's pages through the two API calls with
//!    resumability; the only stage that writes output files

pub mod encode;
pub mod process;
pub mod render;
