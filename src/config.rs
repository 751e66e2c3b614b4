//! Configuration for an OCR pipeline run.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`] or loaded from a YAML settings file with
//! [`PipelineConfig::from_file`]. Keeping every knob in one struct makes it
//! trivial to pass into the client and processor, log it, and diff two runs
//! to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest; `build()` validates the result.

use crate::error::PipelineError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use ocrmill::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .endpoint("https://llm.example.com/v1/chat/completions")
///     .api_key("sk-...")
///     .vision_model("deepseek-ocr")
///     .text_model("qwen2.5-72b")
///     .input_dir("input_pdfs")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Full URL of the chat-completions endpoint.
    pub endpoint: String,

    /// Bearer token sent in the `Authorization` header.
    pub api_key: String,

    /// Model id used for the vision extraction step.
    pub vision_model: String,

    /// Model id used for the markdown refinement step.
    pub text_model: String,

    /// Directory searched recursively for `*.pdf` inputs. Default: `input_pdfs`.
    pub input_dir: PathBuf,

    /// Root of the raw-extraction output tree. Default: `output_raw`.
    pub raw_dir: PathBuf,

    /// Root of the refined-markdown output tree. Default: `output_texts`.
    pub text_dir: PathBuf,

    /// When set, every rendered page JPEG is also written here, one
    /// subdirectory per PDF. Debug aid; off by default.
    pub temp_image_dir: Option<PathBuf>,

    /// Rendering resolution in dots per inch. Range 72–400. Default: 200.
    pub dpi: u32,

    /// Cap on the longest edge of a rendered page in pixels. Default: 2000.
    ///
    /// A safety net independent of DPI: a 200-DPI render of an A0 poster
    /// would otherwise produce a five-figure pixel dimension and exhaust
    /// memory before the encoder ever sees it.
    pub max_rendered_pixels: u32,

    /// Maximum attempts per API call (first try included). Default: 5.
    pub max_attempts: u32,

    /// Base backoff delay. Default: 5 s.
    ///
    /// A transient failure on attempt `n` sleeps `base * 2^n`; a rate-limit
    /// response sleeps twice that. At the default this is the documented
    /// `2^n * 5 s` / `2^n * 10 s` schedule. Tests inject a millisecond base
    /// so retry paths run fast.
    pub retry_delay: Duration,

    /// Per-attempt HTTP timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Skip TLS certificate validation for the endpoint. Default: false.
    ///
    /// Some self-hosted gateways sit behind self-signed certificates; this
    /// opts into trusting them. Leave off unless you control the endpoint.
    pub accept_invalid_certs: bool,

    /// Sampling temperature for the vision extraction call. Default: 0.1.
    pub vision_temperature: f32,

    /// Token cap for the vision extraction call. Default: 4096.
    pub vision_max_tokens: u32,

    /// Token cap for the refinement call. Default: 8192.
    ///
    /// Refinement is deterministic by construction (temperature 0.0), so no
    /// temperature knob exists for it.
    pub text_max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            vision_model: String::new(),
            text_model: String::new(),
            input_dir: PathBuf::from("input_pdfs"),
            raw_dir: PathBuf::from("output_raw"),
            text_dir: PathBuf::from("output_texts"),
            temp_image_dir: None,
            dpi: 200,
            max_rendered_pixels: 2000,
            max_attempts: 5,
            retry_delay: Duration::from_secs(5),
            api_timeout_secs: 60,
            accept_invalid_certs: false,
            vision_temperature: 0.1,
            vision_max_tokens: 4096,
            text_max_tokens: 8192,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from a YAML settings file.
    ///
    /// The file uses the nested layout:
    ///
    /// ```yaml
    /// api:
    ///   base_url: https://llm.example.com/v1/chat/completions
    ///   api_key: sk-...
    ///   accept_invalid_certs: false
    /// models:
    ///   vision: deepseek-ocr
    ///   text: qwen2.5-72b
    /// paths:
    ///   input_pdfs: input_pdfs
    ///   output_raw: output_raw
    ///   output_texts: output_texts
    ///   temp_images: tmp/pages   # optional
    /// processing:
    ///   dpi: 200
    ///   max_retry: 5
    ///   retry_delay: 5
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| PipelineError::ConfigLoad {
                path: path.to_path_buf(),
                source,
            })?;

        let defaults = Self::default();
        let cfg = Self {
            endpoint: settings.api.base_url,
            api_key: settings.api.api_key,
            accept_invalid_certs: settings.api.accept_invalid_certs,
            vision_model: settings.models.vision,
            text_model: settings.models.text,
            input_dir: settings.paths.input_pdfs,
            raw_dir: settings.paths.output_raw,
            text_dir: settings.paths.output_texts,
            temp_image_dir: settings.paths.temp_images,
            dpi: settings.processing.dpi.unwrap_or(defaults.dpi),
            max_attempts: settings.processing.max_retry.unwrap_or(defaults.max_attempts),
            retry_delay: settings
                .processing
                .retry_delay
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            ..defaults
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.endpoint.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "api.base_url must not be empty".into(),
            ));
        }
        if self.api_key.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "api.api_key must not be empty".into(),
            ));
        }
        if self.vision_model.is_empty() || self.text_model.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "both models.vision and models.text must be set".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "processing.max_retry must be ≥ 1".into(),
            ));
        }
        if self.dpi < 72 || self.dpi > 400 {
            return Err(PipelineError::InvalidConfig(format!(
                "processing.dpi must be 72–400, got {}",
                self.dpi
            )));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn raw_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.raw_dir = dir.into();
        self
    }

    pub fn text_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.text_dir = dir.into();
        self
    }

    pub fn temp_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_image_dir = Some(dir.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn accept_invalid_certs(mut self, v: bool) -> Self {
        self.config.accept_invalid_certs = v;
        self
    }

    pub fn vision_temperature(mut self, t: f32) -> Self {
        self.config.vision_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vision_max_tokens(mut self, n: u32) -> Self {
        self.config.vision_max_tokens = n;
        self
    }

    pub fn text_max_tokens(mut self, n: u32) -> Self {
        self.config.text_max_tokens = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Settings file layout ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Settings {
    api: ApiSettings,
    models: ModelSettings,
    paths: PathSettings,
    #[serde(default)]
    processing: ProcessingSettings,
}

#[derive(Debug, Deserialize)]
struct ApiSettings {
    base_url: String,
    api_key: String,
    #[serde(default)]
    accept_invalid_certs: bool,
}

#[derive(Debug, Deserialize)]
struct ModelSettings {
    vision: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct PathSettings {
    input_pdfs: PathBuf,
    output_raw: PathBuf,
    output_texts: PathBuf,
    #[serde(default)]
    temp_images: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessingSettings {
    #[serde(default)]
    dpi: Option<u32>,
    #[serde(default)]
    max_retry: Option<u32>,
    /// Base retry delay in whole seconds.
    #[serde(default)]
    retry_delay: Option<u64>,
}
