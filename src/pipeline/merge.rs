//! Chunked merging: serialise an ordered unit list into one artifact.
//!
//! ## Archives
//!
//! Every unit is stored under its bare file name, in order, so the merged
//! CBZ is flat. Entries are stored uncompressed: pages are already JPEG/PNG.
//!
//! ## Documents
//!
//! Composing PDFs keeps source documents open while they are appended. A
//! 3 000-page series composed in one pass would exceed the default
//! per-process file-descriptor limit, so units are composed in batches of at
//! most `batch_cap` into intermediate documents under the batch root, and
//! the intermediates are then composed, in order, into the artifact. A list
//! that fits in one batch is composed directly.
//!
//! ## Atomicity
//!
//! The artifact is assembled in a temporary file next to its final path and
//! renamed into place only once complete. A failed merge drops the temporary
//! file, so nothing partial ever appears in the output directory.

use crate::config::OutputFormat;
use crate::error::CbzMergeError;
use crate::output::OutputArtifact;
use crate::pipeline::render::DocumentBackend;
use crate::pipeline::transform::Unit;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Default maximum number of documents composed in one pass.
pub const DEFAULT_BATCH_CAP: usize = 250;

/// Everything the merger needs besides the units themselves.
#[derive(Clone, Copy)]
pub struct MergeContext<'a> {
    pub format: OutputFormat,
    /// Required for [`OutputFormat::Document`].
    pub backend: Option<&'a dyn DocumentBackend>,
    pub batch_root: &'a Path,
    pub batch_cap: usize,
}

/// Merge `units` into a single artifact at `dest`.
///
/// # Errors
/// [`CbzMergeError::Merge`] naming `dest` (or the intermediate batch that
/// failed). No file is left at `dest` on failure.
pub fn merge_units(
    units: &[Unit],
    dest: &Path,
    ctx: &MergeContext<'_>,
) -> Result<OutputArtifact, CbzMergeError> {
    if units.is_empty() {
        return Err(merge_error(dest, "no pages to merge"));
    }
    info!("Writing {} ({} pages)", dest.display(), units.len());

    let batches = match ctx.format {
        OutputFormat::Archive => {
            write_archive(units, dest)?;
            0
        }
        OutputFormat::Document => {
            let backend = ctx
                .backend
                .ok_or_else(|| merge_error(dest, "no document backend configured"))?;
            write_document(units, dest, backend, ctx.batch_root, ctx.batch_cap)?
        }
    };

    Ok(OutputArtifact {
        path: dest.to_path_buf(),
        format: ctx.format,
        units: units.len(),
        batches,
    })
}

fn write_archive(units: &[Unit], dest: &Path) -> Result<(), CbzMergeError> {
    let mut tmp = temp_beside(dest)?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    {
        let mut zip = ZipWriter::new(BufWriter::new(tmp.as_file_mut()));
        for unit in units {
            debug!("Adding: {}", unit.name);
            zip.start_file(unit.name.as_str(), options)
                .map_err(|e| merge_error(dest, e))?;
            let mut src = File::open(&unit.path)
                .map_err(|e| merge_error(dest, format!("{}: {e}", unit.path.display())))?;
            std::io::copy(&mut src, &mut zip).map_err(|e| merge_error(dest, e))?;
        }
        let mut out = zip.finish().map_err(|e| merge_error(dest, e))?;
        out.flush().map_err(|e| merge_error(dest, e))?;
    }

    persist(tmp, dest)
}

/// Returns the number of intermediate documents written.
fn write_document(
    units: &[Unit],
    dest: &Path,
    backend: &dyn DocumentBackend,
    batch_root: &Path,
    batch_cap: usize,
) -> Result<usize, CbzMergeError> {
    let batch_cap = batch_cap.max(1);
    let tmp = temp_beside(dest)?;

    if units.len() <= batch_cap {
        let sources: Vec<PathBuf> = units.iter().map(|u| u.path.clone()).collect();
        backend
            .compose(&sources, tmp.path())
            .map_err(|e| merge_error(dest, e))?;
        persist(tmp, dest)?;
        return Ok(0);
    }

    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged".to_string());
    let total = units.len().div_ceil(batch_cap);
    let mut intermediates = Vec::with_capacity(total);

    for (n, batch) in units.chunks(batch_cap).enumerate() {
        let path = batch_root.join(format!("{stem}-{n}.pdf"));
        info!("Composing batch [{}/{}] ({} pages)", n + 1, total, batch.len());
        let sources: Vec<PathBuf> = batch.iter().map(|u| u.path.clone()).collect();
        backend
            .compose(&sources, &path)
            .map_err(|e| merge_error(&path, e))?;
        intermediates.push(path);
    }

    info!("Composing {} batches into {}", intermediates.len(), dest.display());
    backend
        .compose(&intermediates, tmp.path())
        .map_err(|e| merge_error(dest, e))?;
    persist(tmp, dest)?;

    for path in &intermediates {
        std::fs::remove_file(path).map_err(|e| CbzMergeError::io(path, e))?;
    }
    Ok(intermediates.len())
}

fn temp_beside(dest: &Path) -> Result<NamedTempFile, CbzMergeError> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    tempfile::Builder::new()
        .prefix(".cbzmerge-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| merge_error(dest, e))
}

fn persist(tmp: NamedTempFile, dest: &Path) -> Result<(), CbzMergeError> {
    tmp.persist(dest).map_err(|e| merge_error(dest, e.error))?;
    Ok(())
}

fn merge_error(artifact: &Path, e: impl std::fmt::Display) -> CbzMergeError {
    CbzMergeError::Merge {
        artifact: artifact.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Make a volume key usable as a file stem.
///
/// Path separators and characters Windows rejects become `_`; surrounding
/// whitespace and trailing dots are trimmed.
pub fn sanitize_file_stem(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    if cleaned.is_empty() {
        "volume".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Assigns unique artifact file names to a sequence of stems.
///
/// The first use of a stem keeps it as is; later uses get ` (2)`, ` (3)`, …
/// so two non-contiguous runs of the same volume key do not overwrite each
/// other.
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    seen: HashMap<String, usize>,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_name(&mut self, stem: &str, format: OutputFormat) -> String {
        let stem = sanitize_file_stem(stem);
        let count = self.seen.entry(stem.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            format!("{stem}.{}", format.extension())
        } else {
            format!("{stem} ({count}).{}", format.extension())
        }
    }
}
