//! Configuration types for a merge run.
//!
//! Every knob lives in [`MergeConfig`], built via [`MergeConfigBuilder`].
//! The config is shared by reference with every stage; together with the
//! [`crate::layout::RunLayout`] it is the whole run context.

use crate::error::CbzMergeError;
use crate::pipeline::merge::DEFAULT_BATCH_CAP;
use crate::pipeline::render::{DocumentBackend, PdfiumBackend};
use crate::progress::ProgressCallback;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default base name of the single merged output.
pub const DEFAULT_ARCHIVE_NAME: &str = "CBZ_Archive";

/// Default document compression level.
pub const DEFAULT_COMPRESSION: f32 = 0.8;

/// Configuration for a merge run.
///
/// # Example
/// ```rust
/// use cbz_merge::{MergeConfig, OutputFormat};
///
/// let config = MergeConfig::builder()
///     .archive_name("One Piece")
///     .format(OutputFormat::Document)
///     .volumize(r"Vol\.? ?\d+")
///     .compression(0.5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct MergeConfig {
    /// File stem of the single merged artifact. Default: `CBZ_Archive`.
    ///
    /// Ignored when volumizing: each volume is named after its key.
    pub archive_name: String,

    /// Output container. Default: [`OutputFormat::Archive`].
    pub format: OutputFormat,

    /// One artifact, or one per volume. Default: [`Grouping::Single`].
    pub grouping: Grouping,

    /// Document page compression in `[0, 1]`. Default: 0.8.
    ///
    /// Only used for [`OutputFormat::Document`]. Higher values lower the
    /// resolution images are kept at (300 DPI at 0.0, 150 DPI at 1.0).
    pub compression: f32,

    /// Parallel extraction workers. Default: available parallelism.
    pub extract_workers: usize,

    /// Transform partitions running at once. Default: 1.
    ///
    /// Each transform worker holds one decoded page image at a time, so this
    /// bounds peak memory in document mode.
    pub transform_concurrency: usize,

    /// Artifacts written at once when volumizing. Default: 1.
    pub merge_concurrency: usize,

    /// Maximum documents composed in one pass. Default: 250.
    pub batch_cap: usize,

    /// Output root. Default: `<source>/merged`.
    pub output_dir: Option<PathBuf>,

    /// Work root for extraction, staging and batches. Default:
    /// `<source>/.cbzmerge`.
    pub work_dir: Option<PathBuf>,

    /// Keep the work root after a successful run. Default: false.
    pub keep_work_dir: bool,

    /// Backend used for document output. If None, a [`PdfiumBackend`] is
    /// created on demand.
    pub document_backend: Option<Arc<dyn DocumentBackend>>,

    /// Explicit libpdfium location (file or directory). Falls back to
    /// `PDFIUM_LIB_PATH`.
    pub pdfium_library: Option<PathBuf>,

    /// Receives stage and artifact events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            format: OutputFormat::default(),
            grouping: Grouping::default(),
            compression: DEFAULT_COMPRESSION,
            extract_workers: default_workers(),
            transform_concurrency: 1,
            merge_concurrency: 1,
            batch_cap: DEFAULT_BATCH_CAP,
            output_dir: None,
            work_dir: None,
            keep_work_dir: false,
            document_backend: None,
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MergeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfig")
            .field("archive_name", &self.archive_name)
            .field("format", &self.format)
            .field("grouping", &self.grouping)
            .field("compression", &self.compression)
            .field("extract_workers", &self.extract_workers)
            .field("transform_concurrency", &self.transform_concurrency)
            .field("merge_concurrency", &self.merge_concurrency)
            .field("batch_cap", &self.batch_cap)
            .field("output_dir", &self.output_dir)
            .field("work_dir", &self.work_dir)
            .field("keep_work_dir", &self.keep_work_dir)
            .field(
                "document_backend",
                &self.document_backend.as_ref().map(|_| "<dyn DocumentBackend>"),
            )
            .field("pdfium_library", &self.pdfium_library)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn MergeProgressCallback>"),
            )
            .finish()
    }
}

impl MergeConfig {
    /// Create a new builder for `MergeConfig`.
    pub fn builder() -> MergeConfigBuilder {
        MergeConfigBuilder {
            config: Self::default(),
        }
    }

    /// The compiled volume pattern, if volumizing.
    pub fn volume_pattern(&self) -> Result<Option<Regex>, CbzMergeError> {
        match &self.grouping {
            Grouping::Single => Ok(None),
            Grouping::Volumize(pattern) => compile_pattern(pattern).map(Some),
        }
    }

    /// The document backend to use: the configured one, or pdfium.
    pub fn resolve_backend(&self) -> Arc<dyn DocumentBackend> {
        match (&self.document_backend, &self.pdfium_library) {
            (Some(backend), _) => Arc::clone(backend),
            (None, Some(lib)) => Arc::new(PdfiumBackend::with_library(lib)),
            (None, None) => Arc::new(PdfiumBackend::new()),
        }
    }
}

/// Builder for [`MergeConfig`].
#[derive(Debug)]
pub struct MergeConfigBuilder {
    config: MergeConfig,
}

impl MergeConfigBuilder {
    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.config.archive_name = name.into();
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.config.grouping = grouping;
        self
    }

    /// Shorthand for `grouping(Grouping::Volumize(pattern))`.
    pub fn volumize(mut self, pattern: impl Into<String>) -> Self {
        self.config.grouping = Grouping::Volumize(pattern.into());
        self
    }

    pub fn compression(mut self, level: f32) -> Self {
        self.config.compression = level;
        self
    }

    pub fn extract_workers(mut self, n: usize) -> Self {
        self.config.extract_workers = n.max(1);
        self
    }

    pub fn transform_concurrency(mut self, n: usize) -> Self {
        self.config.transform_concurrency = n.max(1);
        self
    }

    pub fn merge_concurrency(mut self, n: usize) -> Self {
        self.config.merge_concurrency = n.max(1);
        self
    }

    pub fn batch_cap(mut self, n: usize) -> Self {
        self.config.batch_cap = n;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn keep_work_dir(mut self, v: bool) -> Self {
        self.config.keep_work_dir = v;
        self
    }

    pub fn document_backend(mut self, backend: Arc<dyn DocumentBackend>) -> Self {
        self.config.document_backend = Some(backend);
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MergeConfig, CbzMergeError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.compression) {
            return Err(CbzMergeError::InvalidConfig(format!(
                "compression must be between 0.0 and 1.0, got {}",
                c.compression
            )));
        }
        if c.batch_cap < 2 {
            return Err(CbzMergeError::InvalidConfig(format!(
                "batch size must be ≥ 2, got {}",
                c.batch_cap
            )));
        }
        let name = c.archive_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(CbzMergeError::InvalidConfig(format!(
                "archive name must be a non-empty file name, got '{}'",
                c.archive_name
            )));
        }
        if let Grouping::Volumize(pattern) = &c.grouping {
            compile_pattern(pattern)?;
        }
        Ok(self.config)
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, CbzMergeError> {
    if pattern.is_empty() {
        return Err(CbzMergeError::InvalidConfig(
            "volume pattern must not be empty".into(),
        ));
    }
    Regex::new(pattern).map_err(|e| {
        CbzMergeError::InvalidConfig(format!("invalid volume pattern '{}': {}", pattern, e))
    })
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Container written for each output unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Flat ZIP of page images (`.cbz`). (default)
    #[default]
    Archive,
    /// Paginated PDF, one page per image (`.pdf`).
    Document,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Archive => "cbz",
            OutputFormat::Document => "pdf",
        }
    }
}

/// How the page stream is split into artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grouping {
    /// Everything goes into one artifact named after `archive_name`. (default)
    #[default]
    Single,
    /// One artifact per contiguous run of pages sharing the first match of
    /// this regex.
    Volumize(String),
}
