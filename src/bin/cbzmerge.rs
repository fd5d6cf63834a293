//! CLI binary for cbz-merge.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `MergeConfig` and prints results.

use anyhow::{Context, Result};
use cbz_merge::{
    merge_directory, CbzMergeError, MergeConfig, MergeProgressCallback, OutputArtifact,
    OutputFormat, ProgressCallback, RunReport, RunState, Stage,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar, reset at every stage, plus a log line
/// per written artifact.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning source directory…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl MergeProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let (prefix, unit) = match stage {
            Stage::Extract => ("Extracting", "archives"),
            Stage::Transform => ("Transforming", "chapters"),
            Stage::Merge => ("Merging", "files"),
        };
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}  {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(prefix);
        self.bar.set_message("");
        self.bar.reset_eta();
    }

    fn on_item_complete(&self, _stage: Stage, label: &str) {
        self.bar.set_message(dim(label));
        self.bar.inc(1);
    }

    fn on_artifact_written(&self, artifact: &OutputArtifact) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            artifact.path.display(),
            dim(&format!("{} pages", artifact.units)),
        ));
    }

    fn on_run_complete(&self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }

    // anyhow prints the error itself once main returns.
    fn on_run_failed(&self, _state: RunState, _error: &CbzMergeError) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge every chapter into merged/CBZ_Archive.cbz
  cbzmerge ~/comics/Berserk

  # One CBZ per volume, named after the match
  cbzmerge ~/comics/Berserk --volumize 'Vol\.? ?\d+'

  # One PDF per volume, smaller pages
  cbzmerge ~/comics/Berserk --vo 'Vol \d+' --pdf --compression 0.9

  # Custom output name and location
  cbzmerge ~/comics/Berserk -a "Berserk Omnibus" -o ~/Books

ENVIRONMENT:
  PDFIUM_LIB_PATH         libpdfium file or directory (needed for --pdf)
  RUST_LOG                Overrides --log-level with a tracing filter
  CBZMERGE_*              Every flag, e.g. CBZMERGE_VOLUMIZE, CBZMERGE_PDF

OUTPUT:
  <path>/merged/<archive>.cbz            single output (default)
  <path>/merged/<volume>.cbz             one per volume with --volumize
  <path>/.cbzmerge/                      work directory, removed on success
"#;

/// Merge a directory of chapter archives into CBZ or PDF volumes.
#[derive(Parser, Debug)]
#[command(
    name = "cbzmerge",
    version,
    about = "Merge a directory of chapter CBZ/ZIP archives into CBZ or PDF volumes",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the source .cbz/.zip archives.
    #[arg(env = "CBZMERGE_PATH")]
    path: PathBuf,

    /// Base name of the merged output (single mode).
    #[arg(short, long, env = "CBZMERGE_ARCHIVE", default_value = "CBZ_Archive")]
    archive: String,

    /// Regex whose first match in each page name defines its volume.
    #[arg(short = 'v', long, visible_alias = "vo", env = "CBZMERGE_VOLUMIZE")]
    volumize: Option<String>,

    /// Write PDF documents instead of CBZ archives.
    #[arg(long, env = "CBZMERGE_PDF")]
    pdf: bool,

    /// PDF page compression, 0.0 (best quality) to 1.0 (smallest).
    #[arg(long, env = "CBZMERGE_COMPRESSION", default_value_t = 0.8)]
    compression: f32,

    /// Log level.
    #[arg(
        short = 'l',
        long,
        visible_alias = "ll",
        env = "CBZMERGE_LOG_LEVEL",
        value_enum,
        ignore_case = true,
        default_value = "info"
    )]
    log_level: LogLevel,

    /// Output directory [default: <path>/merged].
    #[arg(short, long, env = "CBZMERGE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Work directory for extraction and staging [default: <path>/.cbzmerge].
    #[arg(long, env = "CBZMERGE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Parallel extraction workers [default: available CPUs].
    #[arg(short, long, env = "CBZMERGE_JOBS")]
    jobs: Option<usize>,

    /// Chapter partitions transformed at once.
    #[arg(long, env = "CBZMERGE_TRANSFORM_CONCURRENCY", default_value_t = 1)]
    transform_concurrency: usize,

    /// Output files written at once when volumizing.
    #[arg(long, env = "CBZMERGE_MERGE_CONCURRENCY", default_value_t = 1)]
    merge_concurrency: usize,

    /// Maximum PDFs composed in one pass.
    #[arg(long, env = "CBZMERGE_BATCH_SIZE", default_value_t = 250)]
    batch_size: usize,

    /// Keep the work directory after a successful run.
    #[arg(long, env = "CBZMERGE_KEEP_WORK")]
    keep_work: bool,

    /// Disable progress bar.
    #[arg(long, env = "CBZMERGE_NO_PROGRESS")]
    no_progress: bool,

    /// libpdfium file or directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogLevel {
    Info,
    Debug,
    Error,
}

impl LogLevel {
    fn filter(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Error => "error",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would tear the progress bar; keep only errors while
    // it is shown, unless DEBUG was asked for explicitly.
    let show_progress = !cli.no_progress;
    let filter = if show_progress && cli.log_level != LogLevel::Debug {
        "error"
    } else {
        cli.log_level.filter()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn MergeProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let report = merge_directory(&cli.path, &config)
        .await
        .with_context(|| format!("Merge of '{}' failed", cli.path.display()))?;

    if cli.log_level != LogLevel::Error {
        let s = &report.stats;
        eprintln!(
            "{}  {} archives  →  {} pages  →  {} {}  {}",
            green("✔"),
            bold(&s.archives.to_string()),
            s.units,
            bold(&report.artifacts.len().to_string()),
            if report.artifacts.len() == 1 { "file" } else { "files" },
            dim(&format!("{}ms", s.total_duration_ms)),
        );
        if s.skipped_files > 0 {
            eprintln!(
                "   {} {} non-archive file(s) ignored",
                cyan("ℹ"),
                s.skipped_files
            );
        }
        // The progress callback has already listed each artifact.
        if !show_progress {
            for artifact in &report.artifacts {
                eprintln!("   {}", artifact.path.display());
            }
        }
    }

    Ok(())
}

fn build_config(cli: &Cli, progress_cb: Option<ProgressCallback>) -> Result<MergeConfig> {
    let mut builder = MergeConfig::builder()
        .archive_name(&cli.archive)
        .format(if cli.pdf {
            OutputFormat::Document
        } else {
            OutputFormat::Archive
        })
        .compression(cli.compression)
        .transform_concurrency(cli.transform_concurrency)
        .merge_concurrency(cli.merge_concurrency)
        .batch_cap(cli.batch_size)
        .keep_work_dir(cli.keep_work);

    if let Some(ref pattern) = cli.volumize {
        builder = builder.volumize(pattern);
    }
    if let Some(jobs) = cli.jobs {
        builder = builder.extract_workers(jobs);
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
