//! # cbz-merge
//!
//! Merge a directory of per-chapter comic archives (`.cbz` / `.zip`) into a
//! single CBZ or PDF, or into one file per volume.
//!
//! ## Pipeline Overview
//!
//! ```text
//! <source>/*.cbz
//!  │
//!  ├─ 1. Discover   list and classify source archives
//!  ├─ 2. Extract    unpack each archive into its chapter dir (parallel)
//!  ├─ 3. Transform  pages → flat units `<chapter>-<n>.<ext>` or one-page PDFs
//!  ├─ 4. Group      optional: split the unit stream into volumes by regex
//!  └─ 5. Merge      one CBZ/PDF per output, PDFs composed in batches
//! ```
//!
//! Order is preserved across all three levels: archives and chapters in
//! natural order (`Ch 2` before `Ch 10`), pages in natural order inside each
//! chapter.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cbz_merge::{merge_directory, MergeConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MergeConfig::builder()
//!         .format(OutputFormat::Document)
//!         .volumize(r"Vol\.? ?\d+")
//!         .build()?;
//!     let report = merge_directory("/comics/Berserk", &config).await?;
//!     eprintln!("{} files from {} pages", report.artifacts.len(), report.stats.units);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cbzmerge` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cbz-merge = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDF output
//!
//! Document output goes through a [`DocumentBackend`]. The default,
//! [`PdfiumBackend`], binds libpdfium at runtime (`PDFIUM_LIB_PATH`, the
//! working directory, then the system library path). CBZ output needs no
//! native library.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Grouping, MergeConfig, MergeConfigBuilder, OutputFormat};
pub use error::{CbzMergeError, DocumentError};
pub use layout::RunLayout;
pub use orchestrator::{merge_directory, merge_directory_sync, RunState};
pub use output::{OutputArtifact, RunReport, RunStats};
pub use pipeline::render::{DocumentBackend, PdfiumBackend};
pub use progress::{MergeProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
