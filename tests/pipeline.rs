//! End-to-end pipeline tests over temp directories, with a fake transport
//! standing in for the LLM endpoint and a fake rasterizer standing in for
//! pdfium. Input "PDFs" are dummy files; the fake rasterizer fabricates
//! page images without reading them.

use async_trait::async_trait;
use image::DynamicImage;
use ocrmill::client::{ChatRequest, ChatTransport, HttpReply, TransportError};
use ocrmill::{OcrClient, Pipeline, PipelineConfig, PipelineError, Rasterizer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const VISION_MODEL: &str = "vision-model";
const TEXT_MODEL: &str = "text-model";

/// Fabricates fixed-size pages per PDF stem; never touches the file.
struct FakeRasterizer {
    /// Page count per PDF stem; stems not listed fail as corrupt.
    page_counts: HashMap<String, usize>,
}

impl FakeRasterizer {
    fn new(counts: &[(&str, usize)]) -> Arc<Self> {
        Arc::new(Self {
            page_counts: counts
                .iter()
                .map(|(stem, n)| (stem.to_string(), *n))
                .collect(),
        })
    }

    fn pages_for(&self, pdf: &Path) -> Result<usize, PipelineError> {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.page_counts
            .get(&stem)
            .copied()
            .ok_or_else(|| PipelineError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: "unreadable test document".into(),
            })
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, PipelineError> {
        self.pages_for(pdf)
    }

    async fn render_pages(
        &self,
        pdf: &Path,
    ) -> Result<Vec<(usize, DynamicImage)>, PipelineError> {
        let count = self.pages_for(pdf)?;
        Ok((1..=count)
            .map(|n| (n, DynamicImage::new_rgb8(16, 16)))
            .collect())
    }
}

/// Answers every chat request with deterministic content. Extraction
/// requests (vision model) and refinement requests (text model) are told
/// apart by the model id; the Nth call of either kind can be scripted to
/// fail with a non-retriable status.
struct FakeEndpoint {
    vision_calls: AtomicUsize,
    text_calls: AtomicUsize,
    /// 1-indexed vision call that should return HTTP 400, if any.
    fail_vision_call: Option<usize>,
    /// 1-indexed text call that should return HTTP 400, if any.
    fail_text_call: Option<usize>,
}

impl FakeEndpoint {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            vision_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
            fail_vision_call: None,
            fail_text_call: None,
        })
    }

    fn failing_vision_call(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_vision_call: Some(n),
            ..Self::unwrapped_new()
        })
    }

    fn failing_text_call(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_text_call: Some(n),
            ..Self::unwrapped_new()
        })
    }

    fn unwrapped_new() -> Self {
        Self {
            vision_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
            fail_vision_call: None,
            fail_text_call: None,
        }
    }

    fn vision_calls(&self) -> usize {
        self.vision_calls.load(Ordering::SeqCst)
    }

    fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    fn ok(content: &str) -> HttpReply {
        HttpReply {
            status: 200,
            body: serde_json::json!({
                "choices": [{"message": {"content": content}}]
            })
            .to_string(),
        }
    }
}

#[async_trait]
impl ChatTransport for FakeEndpoint {
    async fn send(&self, request: &ChatRequest) -> Result<HttpReply, TransportError> {
        if request.model == VISION_MODEL {
            let call = self.vision_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_vision_call == Some(call) {
                return Ok(HttpReply {
                    status: 400,
                    body: "bad request".into(),
                });
            }
            Ok(Self::ok(&format!("raw extraction {call}")))
        } else {
            let call = self.text_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_text_call == Some(call) {
                return Ok(HttpReply {
                    status: 400,
                    body: "bad request".into(),
                });
            }
            Ok(Self::ok(&format!("# Refined {call}")))
        }
    }
}

/// One temp workspace per test: input/output dirs plus the dummy PDFs.
struct TestWorkspace {
    _dir: TempDir,
    root: PathBuf,
    config: PipelineConfig,
}

impl TestWorkspace {
    fn new(pdf_names: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("in")).unwrap();
        for name in pdf_names {
            fs::write(root.join("in").join(name), b"%PDF-1.4 test").unwrap();
        }

        let config = PipelineConfig::builder()
            .endpoint("https://llm.test/v1/chat/completions")
            .api_key("sk-test")
            .vision_model(VISION_MODEL)
            .text_model(TEXT_MODEL)
            .input_dir(root.join("in"))
            .raw_dir(root.join("raw"))
            .text_dir(root.join("texts"))
            .retry_delay(Duration::from_millis(1))
            .max_attempts(2)
            .build()
            .unwrap();

        Self {
            _dir: dir,
            root,
            config,
        }
    }

    fn pipeline(
        &self,
        endpoint: Arc<FakeEndpoint>,
        rasterizer: Arc<FakeRasterizer>,
    ) -> Pipeline {
        let client = OcrClient::with_transport(&self.config, endpoint);
        Pipeline::with_parts(self.config.clone(), client, rasterizer)
    }

    fn raw_path(&self, stem: &str, page: usize) -> PathBuf {
        self.root
            .join("raw")
            .join(stem)
            .join(format!("{stem}_page_{page}_raw.txt"))
    }

    fn final_path(&self, stem: &str, page: usize) -> PathBuf {
        self.root
            .join("texts")
            .join(stem)
            .join(format!("{stem}_page_{page}.txt"))
    }
}

#[tokio::test]
async fn full_run_writes_both_output_trees() {
    let ws = TestWorkspace::new(&["report.pdf"]);
    let endpoint = FakeEndpoint::new();
    let pipeline = ws.pipeline(endpoint.clone(), FakeRasterizer::new(&[("report", 3)]));

    let summary = pipeline.run(false).await.unwrap();
    assert_eq!(summary.pdfs_found, 1);
    assert_eq!(summary.pages_processed, 3);
    assert_eq!(summary.pages_skipped, 0);
    assert_eq!(summary.pages_failed, 0);

    for page in 1..=3 {
        let raw = fs::read_to_string(ws.raw_path("report", page)).unwrap();
        assert_eq!(raw, format!("raw extraction {page}"));
        let refined = fs::read_to_string(ws.final_path("report", page)).unwrap();
        assert_eq!(refined, format!("# Refined {page}"));
    }
    assert_eq!(endpoint.vision_calls(), 3);
    assert_eq!(endpoint.text_calls(), 3);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let ws = TestWorkspace::new(&["doc.pdf"]);
    let rasterizer = FakeRasterizer::new(&[("doc", 2)]);

    ws.pipeline(FakeEndpoint::new(), rasterizer.clone())
        .run(false)
        .await
        .unwrap();
    let before: Vec<String> = (1..=2)
        .map(|p| fs::read_to_string(ws.final_path("doc", p)).unwrap())
        .collect();

    let endpoint = FakeEndpoint::new();
    let summary = ws
        .pipeline(endpoint.clone(), rasterizer)
        .run(false)
        .await
        .unwrap();
    assert_eq!(summary.pages_processed, 0);
    assert_eq!(summary.pages_skipped, 2);
    assert_eq!(endpoint.vision_calls(), 0, "no API calls on a cached run");

    // Output is byte-identical after the no-op run.
    for (p, expected) in before.iter().enumerate() {
        let after = fs::read_to_string(ws.final_path("doc", p + 1)).unwrap();
        assert_eq!(&after, expected);
    }
}

#[tokio::test]
async fn interrupted_page_is_reprocessed() {
    let ws = TestWorkspace::new(&["doc.pdf"]);
    let rasterizer = FakeRasterizer::new(&[("doc", 3)]);

    ws.pipeline(FakeEndpoint::new(), rasterizer.clone())
        .run(false)
        .await
        .unwrap();

    // Simulate a crash between the raw write and the final write of page 2:
    // the raw file stays behind but the completion marker is gone.
    fs::remove_file(ws.final_path("doc", 2)).unwrap();
    assert!(ws.raw_path("doc", 2).exists());

    let endpoint = FakeEndpoint::new();
    let summary = ws
        .pipeline(endpoint.clone(), rasterizer)
        .run(false)
        .await
        .unwrap();
    assert_eq!(summary.pages_processed, 1);
    assert_eq!(summary.pages_skipped, 2);
    assert_eq!(endpoint.vision_calls(), 1);
    assert!(ws.final_path("doc", 2).exists());
}

#[tokio::test]
async fn force_reprocesses_completed_pages() {
    let ws = TestWorkspace::new(&["doc.pdf"]);
    let rasterizer = FakeRasterizer::new(&[("doc", 2)]);

    ws.pipeline(FakeEndpoint::new(), rasterizer.clone())
        .run(false)
        .await
        .unwrap();

    let endpoint = FakeEndpoint::new();
    let summary = ws
        .pipeline(endpoint.clone(), rasterizer)
        .run(true)
        .await
        .unwrap();
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.pages_skipped, 0);
    assert_eq!(endpoint.vision_calls(), 2);
}

#[tokio::test]
async fn failed_page_does_not_stop_its_neighbours() {
    let ws = TestWorkspace::new(&["doc.pdf"]);
    // Second extraction call (page 2) answers HTTP 400.
    let endpoint = FakeEndpoint::failing_vision_call(2);
    let pipeline = ws.pipeline(endpoint.clone(), FakeRasterizer::new(&[("doc", 3)]));

    let summary = pipeline.run(false).await.unwrap();
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.pages_failed, 1);

    assert!(ws.final_path("doc", 1).exists());
    assert!(!ws.raw_path("doc", 2).exists(), "failed extraction writes nothing");
    assert!(!ws.final_path("doc", 2).exists());
    assert!(ws.final_path("doc", 3).exists());
}

#[tokio::test]
async fn refinement_failure_leaves_raw_file_for_the_retry() {
    let ws = TestWorkspace::new(&["doc.pdf"]);
    let endpoint = FakeEndpoint::failing_text_call(1);
    let rasterizer = FakeRasterizer::new(&[("doc", 1)]);

    let summary = ws
        .pipeline(endpoint, rasterizer.clone())
        .run(false)
        .await
        .unwrap();
    assert_eq!(summary.pages_processed, 0);
    assert_eq!(summary.pages_failed, 1);
    assert!(ws.raw_path("doc", 1).exists(), "raw output is the audit trail");
    assert!(!ws.final_path("doc", 1).exists());

    // The missing final file queues the page again on the next run.
    let summary = ws
        .pipeline(FakeEndpoint::new(), rasterizer)
        .run(false)
        .await
        .unwrap();
    assert_eq!(summary.pages_processed, 1);
    assert!(ws.final_path("doc", 1).exists());
}

#[tokio::test]
async fn corrupt_pdf_is_counted_and_skipped() {
    let ws = TestWorkspace::new(&["bad.pdf", "good.pdf"]);
    // Only "good" is known to the rasterizer; "bad" fails as corrupt.
    let pipeline = ws.pipeline(FakeEndpoint::new(), FakeRasterizer::new(&[("good", 2)]));

    let summary = pipeline.run(false).await.unwrap();
    assert_eq!(summary.pdfs_found, 2);
    assert_eq!(summary.pdfs_failed, 1);
    assert_eq!(summary.pages_processed, 2);
    assert!(ws.final_path("good", 2).exists());
}

#[tokio::test]
async fn empty_input_directory_completes_with_zeros() {
    let ws = TestWorkspace::new(&[]);
    let pipeline = ws.pipeline(FakeEndpoint::new(), FakeRasterizer::new(&[]));

    let summary = pipeline.run(false).await.unwrap();
    assert_eq!(summary.pdfs_found, 0);
    assert_eq!(summary.pages_processed, 0);
}

#[tokio::test]
async fn missing_input_directory_is_not_an_error() {
    let ws = TestWorkspace::new(&[]);
    let mut config = ws.config.clone();
    config.input_dir = ws.root.join("does-not-exist");
    let client = OcrClient::with_transport(&config, FakeEndpoint::new());
    let pipeline = Pipeline::with_parts(config, client, FakeRasterizer::new(&[]));

    let summary = pipeline.run(false).await.unwrap();
    assert_eq!(summary.pdfs_found, 0);
}

#[tokio::test]
async fn temp_image_dir_receives_page_dumps() {
    let ws = TestWorkspace::new(&["doc.pdf"]);
    let mut config = ws.config.clone();
    let dump_root = ws.root.join("dumps");
    config.temp_image_dir = Some(dump_root.clone());
    let client = OcrClient::with_transport(&config, FakeEndpoint::new());
    let pipeline =
        Pipeline::with_parts(config, client, FakeRasterizer::new(&[("doc", 1)]));

    pipeline.run(false).await.unwrap();
    let dump = dump_root.join("doc").join("doc_page_1.jpg");
    let bytes = fs::read(dump).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8], "dump is a JPEG");
}
