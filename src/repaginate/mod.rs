//! Repagination engine.
//!
//! Turns a device scan with arbitrary page breaks into a document whose pages
//! have a fixed physical height, cutting only inside blank horizontal bands.
//!
//! | Stage | Function |
//! |---|---|
//! | **Flatten** | [`PdfBackend::render_pages`] + [`flatten_pages`] |
//! | **Detect** | [`to_luma`] → [`row_intensities`] → [`windowed_medians`] → [`find_candidate_splits`] |
//! | **Select** | [`select_splits`] (greedy, height budget from [`PageGeometry`]) |
//! | **Slice & export** | [`slice_ranges`] + [`slice_image`] + [`PdfBackend::write_pages`] |
//!
//! The module is split into:
//! - **Params**: [`SplitParams`] and [`PageGeometry`]
//! - **Splits**: pure functions over row statistics (unit testable)
//! - **Raster**: stacking and cutting images
//! - **Backend**: [`PdfBackend`] trait, [`PdfiumBackend`] and the CLI's [`LibraryBackend`]
//! - **Operations**: [`repaginate`] and [`copy_document`]

pub mod backend;
mod operations;
mod params;
pub mod pdfium_backend;
mod raster;
mod splits;

pub use backend::{BackendError, PdfBackend};
pub use operations::{
    RepaginateError, RepaginateOptions, RepaginateSummary, copy_document, repaginate,
    staging_path,
};
pub use params::{PageGeometry, SplitParams};
pub use pdfium_backend::{LibraryBackend, PdfiumBackend};
pub use raster::{flatten_pages, slice_image, to_luma};
pub use splits::{
    find_candidate_splits, row_intensities, select_splits, slice_ranges, windowed_medians,
};
