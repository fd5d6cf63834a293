//! Extraction: unpack each source archive into its own chapter directory.
//!
//! Each worker receives a disjoint set of chapters and writes only below
//! `<extract_root>/<chapter>/`, so workers never contend for a directory.
//! Archives sharing a file stem (`Ch 1.cbz`, `Ch 1.zip`) are one chapter:
//! they go to the same worker and unpack into the same directory, later
//! archives overwriting same-named entries.
//! Entry paths are preserved; the `zip` crate refuses entries whose path
//! would escape the chapter directory (`../../etc/passwd`).

use crate::error::CbzMergeError;
use crate::layout::{ensure_dir, RunLayout};
use crate::pipeline::discover::{ContainerFormat, SourceArchive};
use crate::pipeline::natural::natural_cmp_path;
use crate::progress::{ProgressCallback, Stage};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// An extracted chapter directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Chapter name, taken from the source archive's file stem.
    pub name: String,
    /// Directory holding the chapter's pages.
    pub dir: PathBuf,
}

/// Bundle archives by chapter name, keeping first-appearance order.
///
/// Partition the bundles, not the archives, so that every archive of a
/// chapter lands in the same extraction batch.
pub fn group_by_chapter(archives: Vec<SourceArchive>) -> Vec<Vec<SourceArchive>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<SourceArchive>> = Vec::new();
    for archive in archives {
        let name = archive.chapter_name();
        match index.get(&name) {
            Some(&i) => groups[i].push(archive),
            None => {
                index.insert(name, groups.len());
                groups.push(vec![archive]);
            }
        }
    }
    groups
}

/// Extract a batch of archives, in natural order, into `layout.extract_root`.
///
/// Unsupported formats and the run's own directories are skipped. Archives
/// with the same chapter name yield a single [`Chapter`]. The first
/// unreadable archive aborts the batch.
///
/// # Errors
/// [`CbzMergeError::Extraction`] naming the archive that failed.
pub fn extract_archives(
    archives: &[SourceArchive],
    layout: &RunLayout,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<Chapter>, CbzMergeError> {
    let mut ordered: Vec<&SourceArchive> = archives.iter().collect();
    ordered.sort_by(|a, b| natural_cmp_path(&a.path, &b.path));

    let mut chapters = Vec::with_capacity(ordered.len());
    for archive in ordered {
        if archive.format != ContainerFormat::Zip || layout.is_owned(&archive.path) {
            debug!("Not extracting {}", archive.path.display());
            continue;
        }
        if !archive.path.is_file() {
            debug!("Not a file, skipping: {}", archive.path.display());
            continue;
        }
        let chapter = extract_archive(archive, &layout.extract_root)?;
        if let Some(cb) = progress {
            cb.on_item_complete(Stage::Extract, &chapter.name);
        }
        if chapters.iter().any(|c: &Chapter| c.dir == chapter.dir) {
            debug!("Merged {} into chapter {}", archive.path.display(), chapter.name);
            continue;
        }
        chapters.push(chapter);
    }
    Ok(chapters)
}

/// Extract a single archive into `<extract_root>/<chapter-name>/`.
pub fn extract_archive(
    archive: &SourceArchive,
    extract_root: &Path,
) -> Result<Chapter, CbzMergeError> {
    let name = archive.chapter_name();
    let dir = extract_root.join(&name);
    ensure_dir(&dir).map_err(|e| extraction_error(archive, e))?;

    info!("Extracting: {}", name);

    let file = File::open(&archive.path).map_err(|e| extraction_error(archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| extraction_error(archive, e))?;
    let entries = zip.len();
    zip.extract(&dir).map_err(|e| extraction_error(archive, e))?;

    debug!("Extracted {} entries from {}", entries, archive.path.display());
    Ok(Chapter { name, dir })
}

fn extraction_error(archive: &SourceArchive, e: impl std::fmt::Display) -> CbzMergeError {
    CbzMergeError::Extraction {
        archive: archive.path.clone(),
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeConfig;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    fn layout(tmp: &TempDir) -> RunLayout {
        let layout = RunLayout::new(tmp.path(), &MergeConfig::default());
        layout.create_all().unwrap();
        layout
    }

    #[test]
    fn extracts_into_chapter_directory_preserving_paths() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let path = tmp.path().join("Ch 1.cbz");
        write_zip(&path, &[("01.jpg", b"one"), ("sub/02.jpg", b"two")]);

        let chapters = extract_archives(&[SourceArchive::new(&path)], &layout, None).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].name, "Ch 1");
        assert_eq!(std::fs::read(chapters[0].dir.join("01.jpg")).unwrap(), b"one");
        assert_eq!(std::fs::read(chapters[0].dir.join("sub/02.jpg")).unwrap(), b"two");
    }

    #[test]
    fn re_extracting_into_existing_chapter_dir_succeeds() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let path = tmp.path().join("Ch 1.cbz");
        write_zip(&path, &[("01.jpg", b"one")]);
        let archive = SourceArchive::new(&path);

        extract_archive(&archive, &layout.extract_root).unwrap();
        extract_archive(&archive, &layout.extract_root).expect("second extraction is fine");
    }

    #[test]
    fn unsupported_entries_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let cbr = tmp.path().join("Ch 2.cbr");
        std::fs::write(&cbr, b"Rar!").unwrap();

        let chapters = extract_archives(&[SourceArchive::new(&cbr)], &layout, None).unwrap();
        assert!(chapters.is_empty());
    }

    #[test]
    fn corrupt_archive_fails_the_batch_and_names_it() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let good = tmp.path().join("Ch 1.cbz");
        let bad = tmp.path().join("Ch 2.cbz");
        write_zip(&good, &[("01.jpg", b"one")]);
        std::fs::write(&bad, b"this is not a zip file").unwrap();

        let err = extract_archives(
            &[SourceArchive::new(&bad), SourceArchive::new(&good)],
            &layout,
            None,
        )
        .unwrap_err();
        match err {
            CbzMergeError::Extraction { archive, .. } => assert_eq!(archive, bad),
            other => panic!("expected Extraction, got {other:?}"),
        }
    }

    #[test]
    fn same_stem_archives_share_one_chapter() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let cbz = tmp.path().join("Ch 1.cbz");
        let zip = tmp.path().join("Ch 1.zip");
        write_zip(&cbz, &[("a.jpg", b"A")]);
        write_zip(&zip, &[("b.jpg", b"B")]);

        let chapters = extract_archives(
            &[SourceArchive::new(&zip), SourceArchive::new(&cbz)],
            &layout,
            None,
        )
        .unwrap();
        assert_eq!(chapters.len(), 1);
        assert!(chapters[0].dir.join("a.jpg").is_file());
        assert!(chapters[0].dir.join("b.jpg").is_file());
    }

    #[test]
    fn grouping_keeps_same_stem_archives_together() {
        let archives = ["Ch 1.cbz", "Ch 2.cbz", "Ch 1.zip", "Ch 3.zip"]
            .iter()
            .map(|n| SourceArchive::new(PathBuf::from("/src").join(n)))
            .collect();
        let groups = group_by_chapter(archives);
        let names: Vec<Vec<String>> = groups
            .iter()
            .map(|g| {
                g.iter()
                    .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
                    .collect()
            })
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["Ch 1.cbz".to_string(), "Ch 1.zip".to_string()],
                vec!["Ch 2.cbz".to_string()],
                vec!["Ch 3.zip".to_string()],
            ]
        );
    }

    #[test]
    fn batch_is_processed_in_natural_order() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let mut archives = Vec::new();
        for name in ["Ch 10.cbz", "Ch 9.cbz", "Ch 1.cbz"] {
            let p = tmp.path().join(name);
            write_zip(&p, &[("a.png", b"x")]);
            archives.push(SourceArchive::new(p));
        }
        let chapters = extract_archives(&archives, &layout, None).unwrap();
        let names: Vec<&str> = chapters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ch 1", "Ch 9", "Ch 10"]);
    }
}
