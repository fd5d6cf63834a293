//! Run orchestration: discover → extract → transform → group → merge.
//!
//! ## Concurrency
//!
//! Every stage is blocking filesystem or codec work, so it runs on Tokio's
//! blocking pool and is driven from here:
//!
//! * **Extract**: archives are partitioned round-robin into
//!   `extract_workers` groups, one blocking task per group, joined with
//!   `try_join_all`. Transformation never starts before every extraction
//!   task has finished.
//! * **Transform**: chapters are partitioned the same way and run through
//!   `buffered(transform_concurrency)`. The default of 1 keeps a single
//!   decoded page in memory at a time.
//! * **Merge**: one job per output artifact, `buffered(merge_concurrency)`.
//!
//! Results are reassembled in input order (`buffered`, not
//! `buffer_unordered`; chapters re-sorted before flattening), so worker
//! scheduling never changes the page order of an artifact.
//!
//! ## Failure
//!
//! The first error moves the run to [`RunState::Failed`], is reported to
//! `on_run_failed` and is returned.
//! No later stage is scheduled. Blocking tasks already running are not
//! interrupted; they finish in the background. The work root is kept for
//! inspection and cleared at the start of the next run.

use crate::config::{MergeConfig, OutputFormat};
use crate::error::CbzMergeError;
use crate::layout::RunLayout;
use crate::output::{OutputArtifact, RunReport, RunStats};
use crate::pipeline::discover::{discover_sources, SourceArchive};
use crate::pipeline::extract::{extract_archives, group_by_chapter, Chapter};
use crate::pipeline::group::group_volumes;
use crate::pipeline::merge::{merge_units, ArtifactNamer, MergeContext};
use crate::pipeline::partition::partition;
use crate::pipeline::render::DocumentBackend;
use crate::pipeline::transform::{page_stream, transform_chapters, TransformMode, Unit};
use crate::progress::{NoopProgressCallback, ProgressCallback, Stage};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Lifecycle of a run.
///
/// The state lives inside a run and is not returned. Callers observe the
/// terminal states through [`crate::MergeProgressCallback`]:
/// `on_run_complete` for `Done`, `on_run_failed` (with the state the run
/// failed in) for `Failed`.
///
/// ```text
/// Init → Extracting → Transforming ─┬─────────────┬→ Merging → Done
///                                   └→ Grouping ──┘
/// any non-terminal state → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Init,
    Extracting,
    Transforming,
    Grouping,
    Merging,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Init, Extracting)
            | (Extracting, Transforming)
            | (Transforming, Grouping)
            | (Transforming, Merging)
            | (Grouping, Merging)
            | (Merging, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One artifact to write.
struct MergeJob {
    dest: PathBuf,
    units: Vec<Unit>,
}

/// Mutable state of a single run.
struct Run<'a> {
    state: RunState,
    config: &'a MergeConfig,
    layout: Arc<RunLayout>,
    progress: ProgressCallback,
    backend: Option<Arc<dyn DocumentBackend>>,
    stats: RunStats,
}

impl<'a> Run<'a> {
    fn new(source_root: &Path, config: &'a MergeConfig) -> Self {
        let backend = match config.format {
            OutputFormat::Archive => None,
            OutputFormat::Document => Some(config.resolve_backend()),
        };
        Self {
            state: RunState::Init,
            config,
            layout: Arc::new(RunLayout::new(source_root, config)),
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
            backend,
            stats: RunStats::default(),
        }
    }

    fn advance(&mut self, next: RunState) -> Result<(), CbzMergeError> {
        if !self.state.can_transition_to(next) {
            return Err(CbzMergeError::Internal(format!(
                "invalid run state transition {} → {}",
                self.state, next
            )));
        }
        debug!("Run state: {} → {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Move to [`RunState::Failed`], returning the state the run was in.
    fn fail(&mut self, err: &CbzMergeError) -> RunState {
        let at = self.state;
        error!("Run failed during {}: {}", at, err);
        if !at.is_terminal() {
            self.state = RunState::Failed;
        }
        at
    }

    async fn execute(&mut self) -> Result<RunReport, CbzMergeError> {
        let total_start = Instant::now();
        let config = self.config;

        // ── Init: validate, discover, prepare directories ────────────────
        let pattern = config.volume_pattern()?;
        let discovery = discover_sources(&self.layout)?;
        if discovery.archives.is_empty() {
            return Err(CbzMergeError::NoSourceArchives {
                path: self.layout.source_root.clone(),
            });
        }
        self.stats.archives = discovery.archives.len();
        self.stats.skipped_files = discovery.skipped.len();

        self.layout.remove_work()?;
        self.layout.create_all()?;
        self.advance(RunState::Extracting)?;

        // ── Extract ──────────────────────────────────────────────────────
        let start = Instant::now();
        let chapters = self.extract(discovery.archives).await?;
        self.stats.chapters = chapters.len();
        self.stats.extract_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Extracted {} chapter(s) in {}ms",
            chapters.len(),
            self.stats.extract_duration_ms
        );
        self.advance(RunState::Transforming)?;

        // ── Transform ────────────────────────────────────────────────────
        let start = Instant::now();
        let units = self.transform(chapters).await?;
        self.stats.units = units.len();
        self.stats.transform_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Transformed {} page(s) in {}ms",
            units.len(),
            self.stats.transform_duration_ms
        );

        // ── Group ────────────────────────────────────────────────────────
        let jobs: Vec<MergeJob> = match pattern {
            Some(re) => {
                self.advance(RunState::Grouping)?;
                let volumes = group_volumes(&units, &re)?;
                self.stats.volumes = volumes.len();
                let mut namer = ArtifactNamer::new();
                volumes
                    .into_iter()
                    .map(|v| MergeJob {
                        dest: self
                            .layout
                            .output_root
                            .join(namer.file_name(&v.key, config.format)),
                        units: v.units,
                    })
                    .collect()
            }
            None => {
                let mut namer = ArtifactNamer::new();
                vec![MergeJob {
                    dest: self
                        .layout
                        .output_root
                        .join(namer.file_name(&config.archive_name, config.format)),
                    units,
                }]
            }
        };
        self.advance(RunState::Merging)?;

        // ── Merge ────────────────────────────────────────────────────────
        let start = Instant::now();
        let artifacts = self.merge(jobs).await?;
        self.stats.merge_duration_ms = start.elapsed().as_millis() as u64;

        if config.keep_work_dir {
            info!("Keeping work directory {}", self.layout.work_root.display());
        } else {
            self.layout.remove_work()?;
        }

        self.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        self.advance(RunState::Done)?;

        let report = RunReport {
            artifacts,
            stats: self.stats.clone(),
        };
        info!(
            "Merge complete: {} artifact(s) from {} archive(s), {} pages, {}ms total",
            report.artifacts.len(),
            report.stats.archives,
            report.stats.units,
            report.stats.total_duration_ms
        );
        self.progress.on_run_complete(&report);
        Ok(report)
    }

    async fn extract(&self, archives: Vec<SourceArchive>) -> Result<Vec<Chapter>, CbzMergeError> {
        self.progress.on_stage_start(Stage::Extract, archives.len());
        let parts = partition(group_by_chapter(archives), self.config.extract_workers)?;

        let tasks = parts
            .into_iter()
            .map(|part| part.into_iter().flatten().collect::<Vec<_>>())
            .filter(|part| !part.is_empty())
            .map(|part| {
                let layout = Arc::clone(&self.layout);
                let progress = Arc::clone(&self.progress);
                async move {
                    tokio::task::spawn_blocking(move || {
                        extract_archives(&part, &layout, Some(&progress))
                    })
                    .await
                    .map_err(|e| join_error("extraction", e))?
                }
            });

        let chapters = try_join_all(tasks).await?;
        Ok(chapters.into_iter().flatten().collect())
    }

    async fn transform(&self, chapters: Vec<Chapter>) -> Result<Vec<Unit>, CbzMergeError> {
        self.progress.on_stage_start(Stage::Transform, chapters.len());

        let mode = match &self.backend {
            None => TransformMode::Rename,
            Some(backend) => TransformMode::Document {
                backend: Arc::clone(backend),
                compression: self.config.compression,
            },
        };
        debug!("Transform mode: {:?}", mode);

        let parts = partition(chapters, self.config.extract_workers)?;
        let staging_root = self.layout.staging_root.clone();

        let transformed: Vec<_> = stream::iter(parts.into_iter().filter(|p| !p.is_empty()))
            .map(|part| {
                let mode = mode.clone();
                let staging_root = staging_root.clone();
                let progress = Arc::clone(&self.progress);
                async move {
                    tokio::task::spawn_blocking(move || {
                        transform_chapters(part, &mode, &staging_root, Some(&progress))
                    })
                    .await
                    .map_err(|e| join_error("transform", e))?
                }
            })
            .buffered(self.config.transform_concurrency)
            .try_collect()
            .await?;

        Ok(page_stream(transformed.into_iter().flatten().collect()))
    }

    async fn merge(&self, jobs: Vec<MergeJob>) -> Result<Vec<OutputArtifact>, CbzMergeError> {
        self.progress.on_stage_start(Stage::Merge, jobs.len());
        let format = self.config.format;
        let batch_cap = self.config.batch_cap;

        stream::iter(jobs)
            .map(|job| {
                let backend = self.backend.clone();
                let batch_root = self.layout.batch_root.clone();
                let progress = Arc::clone(&self.progress);
                async move {
                    let artifact = tokio::task::spawn_blocking(move || {
                        let ctx = MergeContext {
                            format,
                            backend: backend.as_deref(),
                            batch_root: &batch_root,
                            batch_cap,
                        };
                        merge_units(&job.units, &job.dest, &ctx)
                    })
                    .await
                    .map_err(|e| join_error("merge", e))??;

                    info!("Wrote {} ({} pages)", artifact.path.display(), artifact.units);
                    progress.on_artifact_written(&artifact);
                    let label = artifact
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    progress.on_item_complete(Stage::Merge, &label);
                    Ok::<_, CbzMergeError>(artifact)
                }
            })
            .buffered(self.config.merge_concurrency)
            .try_collect()
            .await
    }
}

fn join_error(stage: &str, e: tokio::task::JoinError) -> CbzMergeError {
    CbzMergeError::Internal(format!("{} worker panicked: {}", stage, e))
}

/// Merge every archive in `source_root` into one or more output artifacts.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// A [`RunReport`] listing the artifacts in page-stream order.
///
/// # Errors
/// The first [`CbzMergeError`] any stage raises. Artifacts completed before
/// the failure stay in the output directory; the failing one never appears.
///
/// # Example
/// ```rust,no_run
/// use cbz_merge::{merge_directory, MergeConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MergeConfig::builder().volumize(r"Vol\.? ?\d+").build()?;
/// let report = merge_directory("/comics/Berserk", &config).await?;
/// for artifact in &report.artifacts {
///     println!("{} ({} pages)", artifact.path.display(), artifact.units);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn merge_directory(
    source_root: impl AsRef<Path>,
    config: &MergeConfig,
) -> Result<RunReport, CbzMergeError> {
    let source_root = source_root.as_ref();
    info!("Starting merge: {}", source_root.display());

    let mut run = Run::new(source_root, config);
    match run.execute().await {
        Ok(report) => Ok(report),
        Err(e) => {
            let at = run.fail(&e);
            run.progress.on_run_failed(at, &e);
            Err(e)
        }
    }
}

/// Synchronous wrapper around [`merge_directory`].
///
/// Creates a temporary tokio runtime internally.
pub fn merge_directory_sync(
    source_root: impl AsRef<Path>,
    config: &MergeConfig,
) -> Result<RunReport, CbzMergeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CbzMergeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(merge_directory(source_root, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_cbz(path: &Path, pages: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, bytes) in pages {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn happy_path_transitions() {
        use RunState::*;
        assert!(Init.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Transforming));
        assert!(Transforming.can_transition_to(Merging));
        assert!(Transforming.can_transition_to(Grouping));
        assert!(Grouping.can_transition_to(Merging));
        assert!(Merging.can_transition_to(Done));
    }

    #[test]
    fn skipping_stages_is_rejected() {
        use RunState::*;
        assert!(!Init.can_transition_to(Transforming));
        assert!(!Extracting.can_transition_to(Merging));
        assert!(!Grouping.can_transition_to(Done));
        assert!(!Merging.can_transition_to(Extracting));
    }

    #[test]
    fn failed_reachable_only_from_live_states() {
        use RunState::*;
        for s in [Init, Extracting, Transforming, Grouping, Merging] {
            assert!(s.can_transition_to(Failed), "{s}");
        }
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn sync_wrapper_merges_a_directory() {
        let tmp = TempDir::new().unwrap();
        write_cbz(&tmp.path().join("Ch 1.cbz"), &[("a.jpg", b"A")]);
        write_cbz(&tmp.path().join("Ch 2.cbz"), &[("a.jpg", b"B")]);

        let report = merge_directory_sync(tmp.path(), &MergeConfig::default()).unwrap();
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.stats.archives, 2);
        assert_eq!(report.stats.units, 2);
        assert!(tmp.path().join("merged/CBZ_Archive.cbz").is_file());
        assert!(!tmp.path().join(".cbzmerge").exists(), "work root removed");
    }

    #[test]
    fn empty_directory_reports_no_archives() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        let err = tokio_test::block_on(merge_directory(tmp.path(), &MergeConfig::default()))
            .unwrap_err();
        assert!(matches!(err, CbzMergeError::NoSourceArchives { .. }));
        assert!(!tmp.path().join("merged").exists(), "nothing created");
    }

    #[tokio::test]
    async fn missing_root_is_reported() {
        let err = merge_directory("/definitely/not/here", &MergeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CbzMergeError::SourceNotFound { .. }));
    }

    #[derive(Default)]
    struct FailureRecorder {
        failed: std::sync::Mutex<Vec<RunState>>,
    }

    impl crate::MergeProgressCallback for FailureRecorder {
        fn on_run_failed(&self, state: RunState, _error: &CbzMergeError) {
            self.failed.lock().unwrap().push(state);
        }
    }

    #[test]
    fn fail_records_the_state_it_left() {
        let tmp = TempDir::new().unwrap();
        let config = MergeConfig::default();
        let mut run = Run::new(tmp.path(), &config);
        run.advance(RunState::Extracting).unwrap();

        let at = run.fail(&CbzMergeError::Internal("boom".into()));
        assert_eq!(at, RunState::Extracting);
        assert_eq!(run.state, RunState::Failed);
        assert!(run.advance(RunState::Transforming).is_err());
    }

    #[tokio::test]
    async fn failure_reports_the_failing_state_once() {
        let tmp = TempDir::new().unwrap();
        write_cbz(&tmp.path().join("Ch 1.cbz"), &[("01.png", b"x")]);
        let recorder = Arc::new(FailureRecorder::default());
        let config = MergeConfig::builder()
            .volumize(r"Vol \d+")
            .progress_callback(recorder.clone())
            .build()
            .unwrap();

        let err = merge_directory(tmp.path(), &config).await.unwrap_err();
        assert!(matches!(err, CbzMergeError::PatternMismatch { .. }));
        assert_eq!(*recorder.failed.lock().unwrap(), vec![RunState::Grouping]);
    }

    #[tokio::test]
    async fn keep_work_dir_leaves_staging_behind() {
        let tmp = TempDir::new().unwrap();
        write_cbz(&tmp.path().join("Ch 1.cbz"), &[("01.png", b"x")]);
        let config = MergeConfig::builder().keep_work_dir(true).build().unwrap();

        merge_directory(tmp.path(), &config).await.unwrap();
        assert!(tmp.path().join(".cbzmerge/staging/Ch 1-0.png").is_file());
    }
}
