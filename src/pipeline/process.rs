//! Per-PDF page loop: resumability check, the two API calls, and output
//! persistence.
//!
//! ## Resumability
//!
//! The final markdown file is the only completion marker — there is no
//! manifest. A page whose final file exists is skipped (unless forced); a
//! page with a raw file but no final file is reprocessed on the next run.
//! That asymmetry is deliberate: an extraction failure writes nothing, a
//! refinement failure leaves the raw file behind, and either way the absence
//! of the final file queues the page for retry. The raw file is never
//! cleaned up.

use crate::client::OcrClient;
use crate::config::PipelineConfig;
use crate::error::{PageError, PipelineError};
use crate::pipeline::encode::{encode_jpeg, EncodedPage};
use crate::pipeline::render::Rasterizer;
use crate::progress::{PageStatus, PipelineProgress};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Per-PDF outcome counts for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PdfReport {
    /// Pages whose final file was written this run.
    pub processed: usize,
    /// Pages skipped because the final file already existed.
    pub skipped: usize,
    /// Pages that failed at some stage; retried on the next run.
    pub failed: usize,
}

/// Compute the raw and final output paths for one page.
///
/// For `input_dir/X.pdf` page `N`: `raw_root/X/X_page_N_raw.txt` and
/// `text_root/X/X_page_N.txt`. Pure path arithmetic; directories are
/// created on demand at write time.
pub fn page_output_paths(
    raw_root: &Path,
    text_root: &Path,
    pdf_path: &Path,
    page_num: usize,
) -> (PathBuf, PathBuf) {
    let stem = pdf_stem(pdf_path);
    let raw_path = raw_root
        .join(&stem)
        .join(format!("{stem}_page_{page_num}_raw.txt"));
    let final_path = text_root
        .join(&stem)
        .join(format!("{stem}_page_{page_num}.txt"));
    (raw_path, final_path)
}

/// Base name of the PDF, used to namespace both output trees.
pub fn pdf_stem(pdf_path: &Path) -> String {
    pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Drive one PDF's pages through rasterisation and the two API calls.
///
/// Returns the per-page outcome counts; `Err` only when rasterisation of
/// the document itself fails (the driver logs it and moves on — a corrupt
/// PDF yields zero pages, never an aborted run). A page-level failure is
/// logged, counted, and the loop continues with the next page.
pub async fn process_pdf(
    pdf_path: &Path,
    client: &OcrClient,
    rasterizer: &dyn Rasterizer,
    config: &PipelineConfig,
    force: bool,
    progress: Option<&dyn PipelineProgress>,
) -> Result<PdfReport, PipelineError> {
    let stem = pdf_stem(pdf_path);
    info!(pdf = %stem, "converting PDF to images");

    let pages = rasterizer.render_pages(pdf_path).await?;
    let mut report = PdfReport::default();

    for (page_num, image) in pages {
        let (raw_path, final_path) =
            page_output_paths(&config.raw_dir, &config.text_dir, pdf_path, page_num);

        if final_path.exists() && !force {
            debug!(pdf = %stem, page = page_num, "page already processed, skipping");
            report.skipped += 1;
            if let Some(cb) = progress {
                cb.on_page_done(page_num, PageStatus::Skipped);
            }
            continue;
        }

        if let Some(cb) = progress {
            cb.on_page_start(page_num);
        }
        info!(pdf = %stem, page = page_num, "processing page");

        match process_page(&stem, page_num, &image, &raw_path, &final_path, client, config).await
        {
            Ok(()) => {
                report.processed += 1;
                if let Some(cb) = progress {
                    cb.on_page_done(page_num, PageStatus::Processed);
                }
            }
            Err(e) => {
                error!(pdf = %stem, page = page_num, error = %e, "page failed");
                report.failed += 1;
                if let Some(cb) = progress {
                    cb.on_page_done(page_num, PageStatus::Failed);
                }
            }
        }
    }

    Ok(report)
}

/// One page: encode → extract → persist raw → refine → persist final.
async fn process_page(
    stem: &str,
    page_num: usize,
    image: &DynamicImage,
    raw_path: &Path,
    final_path: &Path,
    client: &OcrClient,
    config: &PipelineConfig,
) -> Result<(), PageError> {
    let jpeg = encode_jpeg(image).map_err(|e| PageError::Encode {
        page: page_num,
        detail: e.to_string(),
    })?;

    // Optional debug dump of the rendered page; never fails the page.
    if let Some(ref dump_root) = config.temp_image_dir {
        let dump_dir = dump_root.join(stem);
        let dump_path = dump_dir.join(format!("{stem}_page_{page_num}.jpg"));
        if let Err(e) = tokio::fs::create_dir_all(&dump_dir).await {
            warn!(path = %dump_dir.display(), error = %e, "could not create temp image dir");
        } else if let Err(e) = tokio::fs::write(&dump_path, &jpeg).await {
            warn!(path = %dump_path.display(), error = %e, "could not dump page image");
        }
    }

    let encoded = EncodedPage::from_jpeg(&jpeg);

    let raw_text = client
        .extract_text(&encoded)
        .await
        .map_err(|source| PageError::Extract {
            page: page_num,
            source,
        })?;

    write_page_file(page_num, raw_path, &raw_text).await?;
    debug!(path = %raw_path.display(), "raw text saved");

    let refined = client
        .refine_markdown(&raw_text)
        .await
        .map_err(|source| PageError::Refine {
            page: page_num,
            source,
        })?;

    write_page_file(page_num, final_path, &refined).await?;
    debug!(path = %final_path.display(), "final markdown saved");

    Ok(())
}

/// Write one output file, creating its parent directory on demand.
async fn write_page_file(page_num: usize, path: &Path, content: &str) -> Result<(), PageError> {
    let map = |source: std::io::Error| PageError::Write {
        page: page_num,
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(map)?;
    }
    tokio::fs::write(path, content).await.map_err(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_follow_parallel_trees() {
        let (raw, fin) = page_output_paths(
            Path::new("output_raw"),
            Path::new("output_texts"),
            Path::new("input_pdfs/reports/annual.pdf"),
            3,
        );
        assert_eq!(raw, PathBuf::from("output_raw/annual/annual_page_3_raw.txt"));
        assert_eq!(fin, PathBuf::from("output_texts/annual/annual_page_3.txt"));
    }

    #[test]
    fn output_paths_are_keyed_by_stem_not_full_path() {
        let (a, _) = page_output_paths(
            Path::new("raw"),
            Path::new("texts"),
            Path::new("/abs/deep/tree/doc.pdf"),
            1,
        );
        let (b, _) = page_output_paths(
            Path::new("raw"),
            Path::new("texts"),
            Path::new("doc.pdf"),
            1,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn stem_falls_back_for_pathological_names() {
        assert_eq!(pdf_stem(Path::new("x/y/manual.pdf")), "manual");
        assert_eq!(pdf_stem(Path::new("..")), "document");
    }
}
