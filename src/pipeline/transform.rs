//! Page transformation: chapter directories → flat, ordered unit stream.
//!
//! Pages are the image files of a chapter, found recursively and ordered
//! naturally by their path inside the chapter. Each page becomes exactly one
//! unit in the staging root, named `<chapter>-<index><ext>` with a zero-based
//! index, either by copying it (CBZ output) or by rendering it onto a
//! one-page document (PDF output).
//!
//! Chapter names are unique within a run (archives sharing a stem are
//! extracted into one chapter), so unit names never collide and workers can
//! write to the shared staging root without coordination.

use crate::error::CbzMergeError;
use crate::pipeline::extract::Chapter;
use crate::pipeline::natural::{natural_cmp, natural_cmp_path};
use crate::pipeline::render::DocumentBackend;
use crate::progress::{ProgressCallback, Stage};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// File extensions treated as pages. Everything else in an archive
/// (`ComicInfo.xml`, `Thumbs.db`, …) is ignored.
pub const PAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// A page inside an extracted chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub origin: PathBuf,
    /// Zero-based position within the chapter.
    pub index: usize,
    /// Original extension including the dot (`.jpg`), or empty.
    pub extension: String,
}

/// A transformed page in the staging root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub path: PathBuf,
    /// File name, used both as the archive entry name and as the input of
    /// volume grouping.
    pub name: String,
}

impl Unit {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }
}

/// A chapter together with the units it produced, in page order.
#[derive(Debug, Clone)]
pub struct TransformedChapter {
    pub chapter: Chapter,
    pub units: Vec<Unit>,
}

/// How pages become units.
#[derive(Clone)]
pub enum TransformMode {
    /// Copy the image, keeping its extension.
    Rename,
    /// Render the image onto a one-page document.
    Document {
        backend: Arc<dyn DocumentBackend>,
        compression: f32,
    },
}

impl fmt::Debug for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformMode::Rename => f.write_str("Rename"),
            TransformMode::Document { compression, .. } => f
                .debug_struct("Document")
                .field("backend", &"<dyn DocumentBackend>")
                .field("compression", compression)
                .finish(),
        }
    }
}

/// Name of the unit for page `index` of `chapter`.
pub fn unit_name(chapter: &str, index: usize, extension: &str) -> String {
    format!("{chapter}-{index}{extension}")
}

/// List the pages of a chapter in natural order, indexed from 0.
pub fn list_pages(chapter: &Chapter) -> Result<Vec<Page>, CbzMergeError> {
    let mut found: Vec<(PathBuf, PathBuf)> = Vec::new();

    let walker = WalkDir::new(&chapter.dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && name != "__MACOSX"
        });

    for entry in walker {
        let entry = entry.map_err(|e| CbzMergeError::Transform {
            chapter: chapter.name.clone(),
            page: e.path().map(Path::to_path_buf).unwrap_or_else(|| chapter.dir.clone()),
            detail: e.to_string(),
        })?;
        if !entry.file_type().is_file() || !is_page_file(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&chapter.dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        found.push((entry.path().to_path_buf(), relative));
    }

    found.sort_by(|(_, a), (_, b)| natural_cmp_path(a, b));

    Ok(found
        .into_iter()
        .enumerate()
        .map(|(index, (origin, _))| {
            let extension = origin
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            Page {
                origin,
                index,
                extension,
            }
        })
        .collect())
}

fn is_page_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Transform every page of one chapter into the staging root.
///
/// # Errors
/// [`CbzMergeError::Transform`] for the first page that cannot be copied or
/// rendered. Units written before the failure are left in place.
pub fn transform_chapter(
    chapter: &Chapter,
    mode: &TransformMode,
    staging_root: &Path,
) -> Result<Vec<Unit>, CbzMergeError> {
    let pages = list_pages(chapter)?;
    info!("Transforming chapter '{}' ({} pages)", chapter.name, pages.len());

    let mut units = Vec::with_capacity(pages.len());
    for page in &pages {
        let unit = transform_page(chapter, page, mode, staging_root)?;
        units.push(unit);
    }
    Ok(units)
}

fn transform_page(
    chapter: &Chapter,
    page: &Page,
    mode: &TransformMode,
    staging_root: &Path,
) -> Result<Unit, CbzMergeError> {
    let transform_error = |detail: String| CbzMergeError::Transform {
        chapter: chapter.name.clone(),
        page: page.origin.clone(),
        detail,
    };

    let dest = match mode {
        TransformMode::Rename => {
            let dest = staging_root.join(unit_name(&chapter.name, page.index, &page.extension));
            std::fs::copy(&page.origin, &dest).map_err(|e| transform_error(e.to_string()))?;
            dest
        }
        TransformMode::Document {
            backend,
            compression,
        } => {
            let dest = staging_root.join(unit_name(&chapter.name, page.index, ".pdf"));
            backend
                .render_page(&page.origin, &dest, *compression)
                .map_err(|e| transform_error(e.to_string()))?;
            dest
        }
    };

    debug!("{} → {}", page.origin.display(), dest.display());
    Ok(Unit::new(dest))
}

/// Transform a worker's share of chapters, in natural chapter order.
///
/// `progress` is told about each chapter as it completes.
pub fn transform_chapters(
    mut chapters: Vec<Chapter>,
    mode: &TransformMode,
    staging_root: &Path,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<TransformedChapter>, CbzMergeError> {
    chapters.sort_by(|a, b| natural_cmp(&a.name, &b.name));

    chapters
        .into_iter()
        .map(|chapter| {
            let units = transform_chapter(&chapter, mode, staging_root)?;
            if let Some(cb) = progress {
                cb.on_item_complete(Stage::Transform, &chapter.name);
            }
            Ok(TransformedChapter { chapter, units })
        })
        .collect()
}

/// Flatten transformed chapters from every worker into the canonical page
/// stream: chapters in natural order, each in page order.
pub fn page_stream(mut chapters: Vec<TransformedChapter>) -> Vec<Unit> {
    chapters.sort_by(|a, b| natural_cmp(&a.chapter.name, &b.chapter.name));
    chapters.into_iter().flat_map(|c| c.units).collect()
}
