//! Document backend: one-page PDF rendering and PDF composition.
//!
//! The pipeline only needs two document operations: turn one image into a
//! one-page document, and concatenate documents in order. They sit behind the
//! [`DocumentBackend`] trait so the transformer and the chunked merger can be
//! exercised without a native PDF library; [`PdfiumBackend`] is the
//! production implementation.
//!
//! ## Why no async here?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not be driven from async contexts. Backend methods are
//! plain blocking calls; the orchestrator always invokes them from
//! `tokio::task::spawn_blocking` workers.
//!
//! ## Page canvas
//!
//! Every page is an A5 portrait canvas. The image is fitted inside it with
//! its aspect ratio preserved and centered. Before embedding, images larger
//! than the canvas at the DPI implied by the compression level are
//! downscaled, which bounds both the decoded-image memory per worker and the
//! size of the written document.

use crate::error::DocumentError;
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A5 portrait width in PDF points (148 mm).
pub const PAGE_WIDTH_PT: f32 = 419.53;
/// A5 portrait height in PDF points (210 mm).
pub const PAGE_HEIGHT_PT: f32 = 595.28;

/// The page every image is placed on.
pub fn page_size() -> PdfPagePaperSize {
    PdfPagePaperSize::new_portrait(PdfPagePaperStandardSize::A5)
}

/// DPI used at compression level 0.0.
const MAX_DPI: f32 = 300.0;
/// DPI used at compression level 1.0.
const MIN_DPI: f32 = 150.0;

/// Document operations required by the pipeline.
///
/// Implementations must be `Send + Sync`: one backend instance is shared by
/// every transform and merge worker.
pub trait DocumentBackend: Send + Sync {
    /// Render the image at `image` onto a single page and write it to `dest`.
    ///
    /// `compression` is in `[0, 1]`; higher values produce smaller files.
    fn render_page(&self, image: &Path, dest: &Path, compression: f32)
        -> Result<(), DocumentError>;

    /// Append every document in `sources`, in order, into a new document at
    /// `dest`.
    fn compose(&self, sources: &[PathBuf], dest: &Path) -> Result<(), DocumentError>;
}

/// Where an image lands on the page, in PDF points (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Fit an image of `width × height` pixels inside the page, centered.
pub fn fit_to_page(width: u32, height: u32) -> Placement {
    if width == 0 || height == 0 {
        return Placement {
            x: 0.0,
            y: 0.0,
            width: PAGE_WIDTH_PT,
            height: PAGE_HEIGHT_PT,
        };
    }
    let scale = (PAGE_WIDTH_PT / width as f32).min(PAGE_HEIGHT_PT / height as f32);
    let w = width as f32 * scale;
    let h = height as f32 * scale;
    Placement {
        x: (PAGE_WIDTH_PT - w) / 2.0,
        y: (PAGE_HEIGHT_PT - h) / 2.0,
        width: w,
        height: h,
    }
}

/// Largest pixel box an image is kept at for a given compression level.
pub fn max_pixels(compression: f32) -> (u32, u32) {
    let c = compression.clamp(0.0, 1.0);
    let dpi = MAX_DPI - (MAX_DPI - MIN_DPI) * c;
    let w = (PAGE_WIDTH_PT / 72.0 * dpi).round() as u32;
    let h = (PAGE_HEIGHT_PT / 72.0 * dpi).round() as u32;
    (w, h)
}

/// Decode a page image and downscale it to the compression level's bounds.
///
/// Images already inside the bounds are left untouched; nothing is upscaled.
pub fn load_page_image(path: &Path, compression: f32) -> Result<DynamicImage, DocumentError> {
    let img = image::open(path).map_err(|e| DocumentError::Image {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let (max_w, max_h) = max_pixels(compression);
    if img.width() <= max_w && img.height() <= max_h {
        return Ok(img);
    }

    let resized = img.resize(max_w, max_h, FilterType::Triangle);
    debug!(
        "Downscaled {} from {}x{} to {}x{} px",
        path.display(),
        img.width(),
        img.height(),
        resized.width(),
        resized.height()
    );
    Ok(resized)
}

/// pdfium-backed [`DocumentBackend`].
///
/// The library is located, in order, at the explicit path given to
/// [`PdfiumBackend::with_library`], at `PDFIUM_LIB_PATH`, next to the
/// current working directory, then on the system library path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, DocumentError> {
        let explicit = self
            .library
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DocumentError::Binding(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl DocumentBackend for PdfiumBackend {
    fn render_page(
        &self,
        image: &Path,
        dest: &Path,
        compression: f32,
    ) -> Result<(), DocumentError> {
        let img = load_page_image(image, compression)?;
        let placement = fit_to_page(img.width(), img.height());

        let pdfium = self.bind()?;
        let mut document = pdfium.create_new_pdf().map_err(pdfium_error)?;

        // The page must be dropped (content stream regenerated) before saving.
        {
            let mut page = document
                .pages_mut()
                .create_page_at_end(page_size())
                .map_err(pdfium_error)?;

            page.objects_mut()
                .create_image_object(
                    PdfPoints::new(placement.x),
                    PdfPoints::new(placement.y),
                    &img,
                    Some(PdfPoints::new(placement.width)),
                    Some(PdfPoints::new(placement.height)),
                )
                .map_err(pdfium_error)?;
        }

        document.save_to_file(dest).map_err(pdfium_error)?;
        debug!("Rendered {} → {}", image.display(), dest.display());
        Ok(())
    }

    fn compose(&self, sources: &[PathBuf], dest: &Path) -> Result<(), DocumentError> {
        let pdfium = self.bind()?;
        let mut document = pdfium.create_new_pdf().map_err(pdfium_error)?;

        for source in sources {
            let part = pdfium
                .load_pdf_from_file(source, None)
                .map_err(|e| DocumentError::Pdfium(format!("{}: {:?}", source.display(), e)))?;
            document.pages_mut().append(&part).map_err(pdfium_error)?;
        }

        document.save_to_file(dest).map_err(pdfium_error)?;
        debug!("Composed {} document(s) → {}", sources.len(), dest.display());
        Ok(())
    }
}

fn pdfium_error(e: PdfiumError) -> DocumentError {
    DocumentError::Pdfium(format!("{:?}", e))
}
