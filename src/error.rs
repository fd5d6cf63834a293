//! Error types for the cbz-merge library.
//!
//! Two error types reflect two layers of the pipeline:
//!
//! * [`CbzMergeError`] — **Fatal**: every failure the orchestrator can see.
//!   The run stops at the first one and the caller receives it from
//!   [`crate::merge_directory`]. Each variant carries the archive, chapter,
//!   page or artifact it concerns so the offending input can be located.
//!
//! * [`DocumentError`] — raised by a [`crate::pipeline::render::DocumentBackend`]
//!   (pdfium binding, image decoding, page composition). The transformer and
//!   merger wrap it into a [`CbzMergeError`] together with the unit or
//!   artifact that was being produced.
//!
//! There is no non-fatal path: a run either completes or fails. Transient
//! files left by a failed run live under the work directory, never under the
//! output directory, so re-running is safe.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the cbz-merge library.
#[derive(Debug, Error)]
pub enum CbzMergeError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// Builder validation failed, or a stage was asked for an impossible
    /// partition count.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The source root does not exist.
    #[error("Source directory not found: '{path}'\nUse an existing directory containing .cbz or .zip files.")]
    SourceNotFound { path: PathBuf },

    /// The source root exists but is a file.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// The source root contains nothing the extractor can open.
    #[error("No .cbz or .zip archives found in '{path}'")]
    NoSourceArchives { path: PathBuf },

    // ── Stage errors ──────────────────────────────────────────────────────
    /// A source archive could not be opened or unpacked.
    #[error("Failed to extract '{archive}': {detail}")]
    Extraction { archive: PathBuf, detail: String },

    /// A page could not be copied or converted into a unit.
    #[error("Failed to transform page '{page}' of chapter '{chapter}': {detail}")]
    Transform {
        chapter: String,
        page: PathBuf,
        detail: String,
    },

    /// The volume pattern did not match every unit name. `first` is the
    /// earliest unit without a match (`None` for an empty page stream).
    #[error(
        "Volume pattern '{pattern}' does not match {unmatched} of {units} page names{}",
        first_unmatched(.first)
    )]
    PatternMismatch {
        pattern: String,
        first: Option<String>,
        unmatched: usize,
        units: usize,
    },

    /// An output artifact (or one of its intermediate batches) could not be
    /// composed.
    #[error("Failed to write '{artifact}': {detail}")]
    Merge { artifact: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Work or output directory setup failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A worker task panicked or could not be joined.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CbzMergeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CbzMergeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure inside a document backend.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The pdfium shared library could not be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Document output needs libpdfium at runtime. Either:\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium, or\n\
  • place libpdfium next to the working directory, or\n\
  • install it on the system library path.\n"
    )]
    Binding(String),

    /// The source image could not be decoded.
    #[error("cannot decode image '{path}': {detail}")]
    Image { path: PathBuf, detail: String },

    /// pdfium rejected an operation.
    #[error("pdfium: {0}")]
    Pdfium(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn first_unmatched(first: &Option<String>) -> String {
    match first {
        Some(name) => format!(" (first: '{}')", name),
        None => String::new(),
    }
}
