//! PDF backend trait and shared types.
//!
//! The [`PdfBackend`] trait is the only place the engine touches the PDF
//! format: rendering source pages to pixels, and writing pixel pages back
//! into a document. The production implementation is
//! [`PdfiumBackend`](super::pdfium_backend::PdfiumBackend).

use image::{DynamicImage, RgbImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF library unavailable: {0}")]
    Unavailable(String),
    #[error("failed to render {path}: {message}")]
    Render { path: String, message: String },
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
}

/// Read and write paginated documents.
pub trait PdfBackend {
    /// Render every page of `source` at `dpi`, first page first.
    fn render_pages(&self, source: &Path, dpi: f32) -> Result<Vec<DynamicImage>, BackendError>;

    /// Write `pages` as consecutive pages of a new document at `output`.
    ///
    /// Each page's physical size is its pixel size at `dpi`.
    fn write_pages(&self, pages: &[RgbImage], dpi: f32, output: &Path) -> Result<(), BackendError>;
}
