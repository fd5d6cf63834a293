//! Result types returned by a completed run.

use crate::config::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One written output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub format: OutputFormat,
    /// Number of units (pages) it contains.
    pub units: usize,
    /// Intermediate documents composed on the way (0 when written directly).
    pub batches: usize,
}

/// Counters and timings for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Source archives extracted.
    pub archives: usize,
    /// Entries in the source root that were not archives.
    pub skipped_files: usize,
    pub chapters: usize,
    /// Units in the page stream.
    pub units: usize,
    /// Volumes found (0 when not volumizing).
    pub volumes: usize,
    pub extract_duration_ms: u64,
    pub transform_duration_ms: u64,
    pub merge_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Artifacts in page-stream order.
    pub artifacts: Vec<OutputArtifact>,
    pub stats: RunStats,
}
