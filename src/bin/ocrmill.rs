//! CLI binary for ocrmill.
//!
//! A thin shim over the library crate: loads the settings file, applies the
//! CLI overrides, runs the pipeline, and renders progress with indicatif.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocrmill::{PageStatus, Pipeline, PipelineConfig, PipelineProgress};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal progress observer: one bar per PDF, reset as the pipeline moves
/// from document to document. When the page count is unknown (metadata query
/// failed) the bar runs as a spinner and is finalised to the real count when
/// the PDF finishes.
struct CliProgress {
    bar: ProgressBar,
    length_known: AtomicBool,
    failed_pages: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            length_known: AtomicBool::new(false),
            failed_pages: AtomicUsize::new(0),
        })
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} pages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {pos:>3} pages  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn pdf_name(pdf: &Path) -> String {
        pdf.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf.display().to_string())
    }
}

impl PipelineProgress for CliProgress {
    fn on_run_start(&self, total_pdfs: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pdfs} PDF file(s)…"))
        ));
    }

    fn on_pdf_start(&self, pdf: &Path, total_pages: Option<usize>) {
        self.bar.set_prefix(Self::pdf_name(pdf));
        self.bar.set_position(0);
        self.bar.set_message("");
        match total_pages {
            Some(n) => {
                self.bar.set_length(n as u64);
                self.bar.set_style(Self::bar_style());
                self.length_known.store(true, Ordering::SeqCst);
            }
            None => {
                self.bar.set_style(Self::spinner_style());
                self.length_known.store(false, Ordering::SeqCst);
            }
        }
    }

    fn on_page_start(&self, page_num: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_done(&self, page_num: usize, status: PageStatus) {
        match status {
            PageStatus::Processed => {}
            PageStatus::Skipped => {
                self.bar.set_message(format!("page {page_num} {}", dim("(cached)")));
            }
            PageStatus::Failed => {
                self.failed_pages.fetch_add(1, Ordering::SeqCst);
                self.bar
                    .println(format!("  {} page {page_num} failed", red("✗")));
            }
        }
        self.bar.inc(1);
    }

    fn on_pdf_done(&self, pdf: &Path, processed: usize) {
        // With an unknown total the bar position is the only length we have.
        if !self.length_known.load(Ordering::SeqCst) {
            self.bar.set_length(self.bar.position());
        }
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            Self::pdf_name(pdf),
            dim(&format!("{processed} new page(s)")),
        ));
    }

    fn on_run_done(&self, total_processed: usize) {
        self.bar.finish_and_clear();
        let failed = self.failed_pages.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} pages processed",
                green("✔"),
                bold(&total_processed.to_string())
            );
        } else {
            eprintln!(
                "{} {} pages processed  ({} failed — rerun to retry them)",
                cyan("⚠"),
                bold(&total_processed.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process every PDF under the configured input directory
  ocrmill

  # Point at a different input directory
  ocrmill scans/2024

  # Reprocess everything, ignoring existing output
  ocrmill --force

  # Debug logging, no progress bar
  ocrmill --verbose --no-progress

SETTINGS FILE (default: config/settings.yaml):
  api:
    base_url: https://llm.example.com/v1/chat/completions
    api_key: sk-...
    accept_invalid_certs: false   # opt-in for self-signed gateways
  models:
    vision: deepseek-ocr
    text: qwen2.5-72b
  paths:
    input_pdfs: input_pdfs
    output_raw: output_raw
    output_texts: output_texts
    temp_images: tmp/pages        # optional debug dump of rendered pages
  processing:
    dpi: 200
    max_retry: 5
    retry_delay: 5                # backoff base, seconds

OUTPUT LAYOUT (for input_pdfs/X.pdf, page N):
  output_raw/X/X_page_N_raw.txt   raw vision extraction (audit trail)
  output_texts/X/X_page_N.txt     refined markdown; its existence marks the
                                  page done, so interrupted runs resume

Exit code is 0 even when there is nothing to process."#;

/// Extract structured Markdown from directories of PDFs using a two-stage
/// vision + text LLM pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "ocrmill",
    version,
    about = "Batch-convert PDFs to structured Markdown via a vision LLM OCR pipeline",
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input directory searched recursively for PDFs (overrides the
    /// settings file).
    input_dir: Option<PathBuf>,

    /// Path to the YAML settings file.
    #[arg(short, long, env = "OCRMILL_CONFIG", default_value = "config/settings.yaml")]
    config: PathBuf,

    /// Force re-processing of all pages (ignore existing output).
    #[arg(short, long)]
    force: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCRMILL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, env = "OCRMILL_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // the bar provides the feedback that matters. Verbose wins regardless.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut config = PipelineConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load settings from {:?}", cli.config))?;
    if let Some(dir) = cli.input_dir {
        config.input_dir = dir;
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let mut pipeline = Pipeline::new(config).context("Failed to initialise pipeline")?;
    if show_progress {
        pipeline = pipeline.with_progress(CliProgress::new());
    }

    let summary = pipeline.run(cli.force).await.context("Pipeline failed")?;

    if !cli.quiet && !show_progress {
        eprintln!(
            "Processed {} new page(s) across {} PDF(s) in {}ms",
            summary.pages_processed, summary.pdfs_found, summary.duration_ms
        );
        if summary.pages_skipped > 0 {
            eprintln!("  {} page(s) already done", summary.pages_skipped);
        }
        if summary.pages_failed > 0 || summary.pdfs_failed > 0 {
            eprintln!(
                "  {} page(s) and {} PDF(s) failed — rerun to retry",
                summary.pages_failed, summary.pdfs_failed
            );
        }
    }

    Ok(())
}
