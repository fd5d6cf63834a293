//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn MergeProgressCallback>`] via
//! [`crate::config::MergeConfigBuilder::progress_callback`] to follow a run
//! stage by stage. The `cbzmerge` binary drives its progress bar this way.
//!
//! # Example
//!
//! ```rust
//! use cbz_merge::{MergeConfig, MergeProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl MergeProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, stage: Stage, _label: &str) {
//!         if stage == Stage::Transform {
//!             self.pages.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { pages: AtomicUsize::new(0) });
//!
//! let config = MergeConfig::builder()
//!     .progress_callback(counter as Arc<dyn MergeProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::CbzMergeError;
use crate::orchestrator::RunState;
use crate::output::{OutputArtifact, RunReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage reported to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Items are source archives.
    Extract,
    /// Items are chapters.
    Transform,
    /// Items are output artifacts.
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Merge => "merge",
        })
    }
}

/// Called by the pipeline as it works through each stage.
///
/// Implementations must be `Send + Sync`: extraction and transformation call
/// [`on_item_complete`](Self::on_item_complete) from blocking-pool threads,
/// possibly concurrently. All methods default to no-ops.
pub trait MergeProgressCallback: Send + Sync {
    /// A stage is about to process `total` items.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// One item of `stage` finished. `label` is the archive, chapter or
    /// artifact name.
    fn on_item_complete(&self, stage: Stage, label: &str) {
        let _ = (stage, label);
    }

    /// An artifact was renamed into the output root.
    fn on_artifact_written(&self, artifact: &OutputArtifact) {
        let _ = artifact;
    }

    /// The run finished successfully.
    fn on_run_complete(&self, report: &RunReport) {
        let _ = report;
    }

    /// The run moved to [`RunState::Failed`] while it was in `state`.
    /// Called once, with the error the caller is about to receive.
    fn on_run_failed(&self, state: RunState, error: &CbzMergeError) {
        let _ = (state, error);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl MergeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::MergeConfig`].
pub type ProgressCallback = Arc<dyn MergeProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<(Stage, usize)>>,
        items: AtomicUsize,
        artifacts: AtomicUsize,
        done: AtomicUsize,
    }

    impl MergeProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: Stage, total: usize) {
            self.stages.lock().unwrap().push((stage, total));
        }

        fn on_item_complete(&self, _stage: Stage, _label: &str) {
            self.items.fetch_add(1, Ordering::SeqCst);
        }

        fn on_artifact_written(&self, _artifact: &OutputArtifact) {
            self.artifacts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, report: &RunReport) {
            self.done.store(report.artifacts.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Extract, 3);
        cb.on_item_complete(Stage::Extract, "Ch 1.cbz");
        cb.on_run_complete(&RunReport::default());
        cb.on_run_failed(RunState::Merging, &CbzMergeError::Internal("x".into()));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage_start(Stage::Extract, 2);
        tracker.on_item_complete(Stage::Extract, "a");
        tracker.on_item_complete(Stage::Extract, "b");
        tracker.on_stage_start(Stage::Merge, 1);

        let artifact = OutputArtifact {
            path: "/out/CBZ_Archive.cbz".into(),
            format: OutputFormat::Archive,
            units: 2,
            batches: 0,
        };
        tracker.on_artifact_written(&artifact);
        tracker.on_run_complete(&RunReport {
            artifacts: vec![artifact],
            stats: Default::default(),
        });

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![(Stage::Extract, 2), (Stage::Merge, 1)]
        );
        assert_eq!(tracker.items.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.artifacts.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Transform.to_string(), "transform");
    }
}
