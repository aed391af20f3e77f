//! Production backend on top of Google's PDFium via `pdfium-render`.
//!
//! | Operation | Call |
//! |---|---|
//! | Bind library | `Pdfium::bind_to_library` / `bind_to_system_library` |
//! | Render page | `PdfPage::render_with_config` scaled by `dpi / 72` |
//! | New document | `Pdfium::create_new_pdf` |
//! | Add page | `PdfPages::create_page_at_end` sized in points |
//! | Place raster | `PdfPageObjects::create_image_object` covering the page |
//!
//! PDFium is bound once per process and reused for every document. Rendering
//! happens on the calling thread; the pass worker converts one document at a
//! time.

use super::backend::{BackendError, PdfBackend};
use image::{DynamicImage, RgbImage};
use pdfium_render::prelude::*;
use std::path::Path;

pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind PDFium from an explicit library file, or search the working
    /// directory and then the system library path.
    pub fn new(library: Option<&Path>) -> Result<Self, BackendError> {
        let bindings = match library {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

fn render_error(path: &Path, e: impl std::fmt::Display) -> BackendError {
    BackendError::Render {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> BackendError {
    BackendError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

impl PdfBackend for PdfiumBackend {
    fn render_pages(&self, source: &Path, dpi: f32) -> Result<Vec<DynamicImage>, BackendError> {
        let document = self
            .pdfium
            .load_pdf_from_file(source, None)
            .map_err(|e| render_error(source, e))?;
        let config = PdfRenderConfig::new().scale_page_by_factor(dpi / 72.0);

        let mut pages = Vec::new();
        for page in document.pages().iter() {
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| render_error(source, e))?;
            pages.push(bitmap.as_image());
        }
        Ok(pages)
    }

    fn write_pages(&self, pages: &[RgbImage], dpi: f32, output: &Path) -> Result<(), BackendError> {
        let to_points = |px: u32| PdfPoints::new(px as f32 * 72.0 / dpi);

        let mut document = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| write_error(output, e))?;
        for page_image in pages {
            let width = to_points(page_image.width());
            let height = to_points(page_image.height());
            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::from_points(width, height))
                .map_err(|e| write_error(output, e))?;
            let image = DynamicImage::ImageRgb8(page_image.clone());
            page.objects_mut()
                .create_image_object(PdfPoints::ZERO, PdfPoints::ZERO, &image, Some(width), Some(height))
                .map_err(|e| write_error(output, e))?;
        }
        document
            .save_to_file(output)
            .map_err(|e| write_error(output, e))
    }
}

/// Backend used by the CLI: PDFium when it could be bound.
///
/// A library that only copies documents never renders, so a missing PDFium
/// is tolerated there and reported only if a render is attempted.
pub enum LibraryBackend {
    Pdfium(PdfiumBackend),
    Unavailable(String),
}

impl LibraryBackend {
    /// Bind PDFium. With `required == false` a binding failure yields
    /// [`LibraryBackend::Unavailable`] instead of an error.
    pub fn open(library: Option<&Path>, required: bool) -> Result<Self, BackendError> {
        match PdfiumBackend::new(library) {
            Ok(backend) => Ok(Self::Pdfium(backend)),
            Err(BackendError::Unavailable(reason)) if !required => {
                tracing::debug!(%reason, "PDFium not bound, copy mode only");
                Ok(Self::Unavailable(reason))
            }
            Err(e) => Err(e),
        }
    }
}

impl PdfBackend for LibraryBackend {
    fn render_pages(&self, source: &Path, dpi: f32) -> Result<Vec<DynamicImage>, BackendError> {
        match self {
            Self::Pdfium(backend) => backend.render_pages(source, dpi),
            Self::Unavailable(reason) => Err(BackendError::Unavailable(reason.clone())),
        }
    }

    fn write_pages(&self, pages: &[RgbImage], dpi: f32, output: &Path) -> Result<(), BackendError> {
        match self {
            Self::Pdfium(backend) => backend.write_pages(pages, dpi, output),
            Self::Unavailable(reason) => Err(BackendError::Unavailable(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING: &str = "/nonexistent/libpdfium.so";

    #[test]
    fn missing_library_is_an_error_when_required() {
        assert!(matches!(
            LibraryBackend::open(Some(Path::new(MISSING)), true),
            Err(BackendError::Unavailable(_))
        ));
    }

    #[test]
    fn missing_library_tolerated_for_copy_mode() {
        let backend = LibraryBackend::open(Some(Path::new(MISSING)), false).unwrap();
        assert!(matches!(backend, LibraryBackend::Unavailable(_)));
        assert!(matches!(
            backend.render_pages(Path::new("/in/a.pdf"), 300.0),
            Err(BackendError::Unavailable(_))
        ));
        assert!(matches!(
            backend.write_pages(&[], 300.0, Path::new("/out/a.pdf")),
            Err(BackendError::Unavailable(_))
        ));
    }
}
