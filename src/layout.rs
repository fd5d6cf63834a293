//! Per-run directory layout.
//!
//! Every directory the pipeline reads or writes is derived once, up front,
//! from the source root and the [`crate::MergeConfig`], then passed by
//! reference to each stage. Nothing is stored in process-wide state and no
//! stage changes the working directory, so two runs over different source
//! roots can share a process.
//!
//! ```text
//! <source>/                     source archives (read-only)
//! <work>/extracted/<chapter>/   one directory per source archive
//! <work>/staging/               flat unit stream
//! <work>/batches/               intermediate documents
//! <output>/                     final artifacts only
//! ```

use crate::config::MergeConfig;
use crate::error::CbzMergeError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default work directory name, created inside the source root.
pub const WORK_DIR_NAME: &str = ".cbzmerge";

/// Default output directory name, created inside the source root.
pub const OUTPUT_DIR_NAME: &str = "merged";

/// Resolved directories for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub source_root: PathBuf,
    pub work_root: PathBuf,
    pub extract_root: PathBuf,
    pub staging_root: PathBuf,
    pub batch_root: PathBuf,
    pub output_root: PathBuf,
}

impl RunLayout {
    /// Derive the layout for `source_root`, honouring the directory overrides
    /// in `config`.
    pub fn new(source_root: impl Into<PathBuf>, config: &MergeConfig) -> Self {
        let source_root = source_root.into();
        let work_root = config
            .work_dir
            .clone()
            .unwrap_or_else(|| source_root.join(WORK_DIR_NAME));
        let output_root = config
            .output_dir
            .clone()
            .unwrap_or_else(|| source_root.join(OUTPUT_DIR_NAME));

        Self {
            extract_root: work_root.join("extracted"),
            staging_root: work_root.join("staging"),
            batch_root: work_root.join("batches"),
            work_root,
            output_root,
            source_root,
        }
    }

    /// Create every directory the run writes to.
    pub fn create_all(&self) -> Result<(), CbzMergeError> {
        for dir in [
            &self.work_root,
            &self.extract_root,
            &self.staging_root,
            &self.batch_root,
            &self.output_root,
        ] {
            ensure_dir(dir)?;
        }
        Ok(())
    }

    /// True when `path` is one of the directories this run owns.
    ///
    /// Source discovery uses this to avoid treating its own output or work
    /// directories as input.
    pub fn is_owned(&self, path: &Path) -> bool {
        [
            &self.work_root,
            &self.extract_root,
            &self.staging_root,
            &self.batch_root,
            &self.output_root,
        ]
        .iter()
        .any(|owned| same_path(owned, path))
    }

    /// Remove the directories this run created under the work root, then
    /// the work root itself if nothing else is left in it.
    ///
    /// A user-supplied work directory that holds other files survives.
    pub fn remove_work(&self) -> Result<(), CbzMergeError> {
        for dir in [&self.extract_root, &self.staging_root, &self.batch_root] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CbzMergeError::io(dir, e)),
            }
        }
        match std::fs::remove_dir(&self.work_root) {
            Ok(()) => debug!("Removed work directory {}", self.work_root.display()),
            Err(e) => debug!("Kept work directory {}: {}", self.work_root.display(), e),
        }
        Ok(())
    }
}

/// Create `dir` (and its parents) unless it already exists.
///
/// Calling this on an existing directory is a no-op.
pub fn ensure_dir(dir: &Path) -> Result<(), CbzMergeError> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| CbzMergeError::io(dir, e))
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
