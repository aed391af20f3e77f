//! High-level repagination.
//!
//! Combines the pure split calculations with backend rendering and writing.
//! Output is staged in a hidden sibling file and renamed over the target only
//! when every stage succeeded, so a failed conversion never leaves a partial
//! document where the library expects a finished one.

use super::backend::{BackendError, PdfBackend};
use super::params::{PageGeometry, SplitParams};
use super::raster::{flatten_pages, slice_image, to_luma};
use super::splits::{
    find_candidate_splits, row_intensities, select_splits, slice_ranges, windowed_medians,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RepaginateError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} has no pages")]
    EmptyDocument(PathBuf),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RepaginateOptions {
    pub geometry: PageGeometry,
    pub splits: SplitParams,
}

/// What one repagination did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepaginateSummary {
    pub source_pages: usize,
    pub output_pages: usize,
    /// Number of blank bands found.
    pub candidates: usize,
    /// Rows where the flattened image was cut.
    pub committed: Vec<u32>,
}

/// Hidden sibling used to stage `target` until it is complete.
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.partial"))
}

fn commit_staged(staged: &Path, target: &Path) -> std::io::Result<()> {
    fs::rename(staged, target).inspect_err(|_| {
        let _ = fs::remove_file(staged);
    })
}

/// Re-segment `source` into pages of the configured height and write the
/// result to `target`.
pub fn repaginate(
    backend: &impl PdfBackend,
    source: &Path,
    target: &Path,
    options: &RepaginateOptions,
) -> Result<RepaginateSummary, RepaginateError> {
    let dpi = options.geometry.dpi;
    let pages = backend.render_pages(source, dpi)?;
    if pages.is_empty() {
        return Err(RepaginateError::EmptyDocument(source.to_path_buf()));
    }

    let flat = flatten_pages(&pages);
    let rows = row_intensities(&to_luma(&flat));
    let medians = windowed_medians(&rows, options.splits.median_window);
    let candidates = find_candidate_splits(&medians, &options.splits, flat.height());
    let committed = select_splits(
        &candidates,
        options.geometry.page_height_px(),
        flat.height(),
    );
    let slices = slice_image(&flat, &slice_ranges(&committed, flat.height()));

    debug!(
        source = %source.display(),
        width = flat.width(),
        height = flat.height(),
        candidates = candidates.len(),
        committed = committed.len(),
        "split flattened document"
    );

    let staged = staging_path(target);
    if let Err(e) = backend.write_pages(&slices, dpi, &staged) {
        let _ = fs::remove_file(&staged);
        return Err(e.into());
    }
    commit_staged(&staged, target)?;

    Ok(RepaginateSummary {
        source_pages: pages.len(),
        output_pages: slices.len(),
        candidates: candidates.len(),
        committed,
    })
}

/// Pass-through used when repagination is disabled.
pub fn copy_document(source: &Path, target: &Path) -> std::io::Result<()> {
    let staged = staging_path(target);
    fs::copy(source, &staged).inspect_err(|_| {
        let _ = fs::remove_file(&staged);
    })?;
    commit_staged(&staged, target)
}
