//! End-to-end tests against the real pdfium backend.
//!
//! They need libpdfium at runtime and are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly
//! requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/lib cargo test --test e2e -- --nocapture

use cbz_merge::{merge_directory, MergeConfig, OutputFormat, PdfiumBackend};
use image::{ImageFormat, Rgb, RgbImage};
use pdfium_render::prelude::*;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

fn bind_pdfium() -> Pdfium {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from) {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .expect("libpdfium must be available for e2e tests");
    Pdfium::new(bindings)
}

fn encoded_page(width: u32, height: u32, shade: u8, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([shade, (x % 256) as u8, (y % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn write_chapter(dir: &Path, name: &str, pages: usize, format: ImageFormat) {
    let ext = match format {
        ImageFormat::Png => "png",
        _ => "jpg",
    };
    let mut zip = ZipWriter::new(File::create(dir.join(name)).unwrap());
    for i in 0..pages {
        zip.start_file(format!("{i:03}.{ext}"), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&encoded_page(600, 900, (i * 40) as u8, format))
            .unwrap();
    }
    zip.finish().unwrap();
}

fn page_count(pdfium: &Pdfium, path: &Path) -> usize {
    pdfium
        .load_pdf_from_file(path, None)
        .unwrap_or_else(|e| panic!("{} is not a readable PDF: {e:?}", path.display()))
        .pages()
        .len() as usize
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_pdf_has_one_page_per_image() {
    e2e_skip_unless_ready!();
    let tmp = TempDir::new().unwrap();
    write_chapter(tmp.path(), "Ch 1.cbz", 3, ImageFormat::Jpeg);
    write_chapter(tmp.path(), "Ch 2.cbz", 2, ImageFormat::Png);

    let config = MergeConfig::builder()
        .format(OutputFormat::Document)
        .build()
        .unwrap();
    let report = merge_directory(tmp.path(), &config).await.unwrap();

    let pdf = &report.artifacts[0].path;
    assert_eq!(pdf, &tmp.path().join("merged/CBZ_Archive.pdf"));
    assert_eq!(page_count(&bind_pdfium(), pdf), 5);
}

#[tokio::test]
async fn test_batched_composition_keeps_every_page() {
    e2e_skip_unless_ready!();
    let tmp = TempDir::new().unwrap();
    for ch in 1..=4 {
        write_chapter(tmp.path(), &format!("Ch {ch}.cbz"), 4, ImageFormat::Jpeg);
    }

    let config = MergeConfig::builder()
        .format(OutputFormat::Document)
        .batch_cap(5)
        .build()
        .unwrap();
    let report = merge_directory(tmp.path(), &config).await.unwrap();

    let artifact = &report.artifacts[0];
    assert_eq!(artifact.batches, 4);
    assert_eq!(page_count(&bind_pdfium(), &artifact.path), 16);
}

#[tokio::test]
async fn test_pages_are_a5_portrait() {
    e2e_skip_unless_ready!();
    let tmp = TempDir::new().unwrap();
    write_chapter(tmp.path(), "Ch 1.cbz", 1, ImageFormat::Png);

    let config = MergeConfig::builder()
        .format(OutputFormat::Document)
        .document_backend(Arc::new(PdfiumBackend::new()))
        .build()
        .unwrap();
    let report = merge_directory(tmp.path(), &config).await.unwrap();

    let pdfium = bind_pdfium();
    let doc = pdfium
        .load_pdf_from_file(&report.artifacts[0].path, None)
        .unwrap();
    let page = doc.pages().get(0).unwrap();
    assert!((page.width().value - 419.53).abs() < 1.0);
    assert!((page.height().value - 595.28).abs() < 1.0);
}

#[tokio::test]
async fn test_higher_compression_gives_smaller_files() {
    e2e_skip_unless_ready!();
    let mut sizes = Vec::new();
    for level in [0.0, 1.0] {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let mut zip = ZipWriter::new(File::create(dir.join("Ch 1.cbz")).unwrap());
        zip.start_file("big.png", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&encoded_page(2400, 3400, 90, ImageFormat::Png))
            .unwrap();
        zip.finish().unwrap();

        let config = MergeConfig::builder()
            .format(OutputFormat::Document)
            .compression(level)
            .build()
            .unwrap();
        let report = merge_directory(dir, &config).await.unwrap();
        sizes.push(std::fs::metadata(&report.artifacts[0].path).unwrap().len());
    }
    assert!(sizes[1] < sizes[0], "sizes: {sizes:?}");
}

#[tokio::test]
async fn test_volumized_pdfs() {
    e2e_skip_unless_ready!();
    let tmp = TempDir::new().unwrap();
    write_chapter(tmp.path(), "Vol 1 Ch 1.cbz", 2, ImageFormat::Jpeg);
    write_chapter(tmp.path(), "Vol 1 Ch 2.cbz", 1, ImageFormat::Jpeg);
    write_chapter(tmp.path(), "Vol 2 Ch 3.cbz", 2, ImageFormat::Jpeg);

    let config = MergeConfig::builder()
        .format(OutputFormat::Document)
        .volumize(r"Vol \d+")
        .build()
        .unwrap();
    let report = merge_directory(tmp.path(), &config).await.unwrap();

    let pdfium = bind_pdfium();
    let counts: Vec<(String, usize)> = report
        .artifacts
        .iter()
        .map(|a| {
            (
                a.path.file_name().unwrap().to_string_lossy().into_owned(),
                page_count(&pdfium, &a.path),
            )
        })
        .collect();
    assert_eq!(
        counts,
        vec![("Vol 1.pdf".to_string(), 3), ("Vol 2.pdf".to_string(), 2)]
    );
}
