//! Source discovery: classify the entries of the source root.
//!
//! Only the top level of the source root is scanned. Directories (including
//! the run's own work and output directories) are ignored, and files whose
//! extension is not a supported container are reported as skipped rather
//! than failing the run. A `.cbz` that turns out to be corrupt is *not*
//! filtered here: it fails loudly in the extractor, where the error can name
//! the archive.

use crate::error::CbzMergeError;
use crate::layout::RunLayout;
use crate::pipeline::natural::natural_cmp_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Container format inferred from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerFormat {
    /// ZIP container (`.cbz`, `.zip`).
    Zip,
    /// Anything the extractor cannot open (`.cbr`, `.7z`, `.txt`, …).
    Unsupported,
}

impl ContainerFormat {
    /// Infer the format from the extension, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("cbz") | Some("zip") => ContainerFormat::Zip,
            _ => ContainerFormat::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self != ContainerFormat::Unsupported
    }
}

/// A source archive found in the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArchive {
    pub path: PathBuf,
    pub format: ContainerFormat,
}

impl SourceArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ContainerFormat::from_path(&path);
        Self { path, format }
    }

    /// Chapter name: the file name without its extension.
    pub fn chapter_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of scanning a source root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Supported archives in natural order of their file names.
    pub archives: Vec<SourceArchive>,
    /// Files that were seen but not selected.
    pub skipped: Vec<PathBuf>,
}

/// Validate the source root and list its supported archives.
///
/// # Errors
/// - [`CbzMergeError::SourceNotFound`] / [`CbzMergeError::NotADirectory`]
///   when the root is unusable.
/// - [`CbzMergeError::Io`] when the root cannot be listed.
pub fn discover_sources(layout: &RunLayout) -> Result<Discovery, CbzMergeError> {
    let root = &layout.source_root;
    if !root.exists() {
        return Err(CbzMergeError::SourceNotFound { path: root.clone() });
    }
    if !root.is_dir() {
        return Err(CbzMergeError::NotADirectory { path: root.clone() });
    }

    let entries = std::fs::read_dir(root).map_err(|e| CbzMergeError::io(root, e))?;
    let mut discovery = Discovery::default();

    for entry in entries {
        let entry = entry.map_err(|e| CbzMergeError::io(root, e))?;
        let path = entry.path();

        if path.is_dir() || layout.is_owned(&path) {
            continue;
        }

        let archive = SourceArchive::new(path);
        if archive.format.is_supported() {
            discovery.archives.push(archive);
        } else {
            debug!("Skipping unsupported file: {}", archive.path.display());
            discovery.skipped.push(archive.path);
        }
    }

    discovery
        .archives
        .sort_by(|a, b| natural_cmp_path(&a.path, &b.path));
    discovery.skipped.sort_by(|a, b| natural_cmp_path(a, b));

    info!(
        "Found {} archive(s) in {} ({} other file(s) skipped)",
        discovery.archives.len(),
        root.display(),
        discovery.skipped.len()
    );
    Ok(discovery)
}
