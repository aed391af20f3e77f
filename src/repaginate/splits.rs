//! Pure split calculations.
//!
//! Everything here works on plain numbers so the algorithm can be exercised
//! with synthetic inputs:
//!
//! ```text
//! grayscale rows ──row_intensities──▶ [u32; H]
//!                ──windowed_medians─▶ [u32; H-W+1]
//!                ──find_candidate_splits─▶ candidate rows (strictly increasing)
//!                ──select_splits────▶ committed rows
//!                ──slice_ranges─────▶ [start, end) per output page
//! ```

use super::params::SplitParams;
use image::GrayImage;
use rayon::prelude::*;
use std::ops::Range;

/// Mean intensity of every row, scaled by 100 and truncated.
///
/// White rows score 25500, black rows 0.
pub fn row_intensities(image: &GrayImage) -> Vec<u32> {
    let width = image.width() as usize;
    if width == 0 {
        return vec![0; image.height() as usize];
    }
    image
        .as_raw()
        .par_chunks_exact(width)
        .map(|row| {
            let sum: u64 = row.iter().map(|&p| u64::from(p)).sum();
            (sum * 100 / width as u64) as u32
        })
        .collect()
}

/// Median of each forward window of `window` consecutive values.
///
/// Produces `len - window + 1` values (none when the input is shorter than
/// the window). Even windows average the two middle values.
pub fn windowed_medians(values: &[u32], window: usize) -> Vec<u32> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let mut scratch = Vec::with_capacity(window);
    values
        .windows(window)
        .map(|w| {
            scratch.clear();
            scratch.extend_from_slice(w);
            scratch.sort_unstable();
            let mid = window / 2;
            if window % 2 == 1 {
                scratch[mid]
            } else {
                ((u64::from(scratch[mid - 1]) + u64::from(scratch[mid])) / 2) as u32
            }
        })
        .collect()
}

/// Cut rows inside sufficiently tall blank bands.
///
/// A closed band `[start, end)` of at least `split_height` blank rows is cut at
/// its midpoint, pushed down to at least `end - split_margin`. A band still
/// open at the bottom is cut `split_margin` rows below its start. Cuts that
/// fall outside `1..image_height` are dropped.
pub fn find_candidate_splits(medians: &[u32], params: &SplitParams, image_height: u32) -> Vec<u32> {
    let mut cuts = Vec::new();
    let mut band_start: Option<usize> = None;

    for (pos, &median) in medians.iter().enumerate() {
        if median >= params.median_threshold {
            band_start.get_or_insert(pos);
        } else if let Some(start) = band_start.take() {
            if pos - start >= params.split_height as usize {
                let mid = (start + pos) / 2;
                let late = pos.saturating_sub(params.split_margin as usize);
                cuts.push(mid.max(late));
            }
        }
    }
    if let Some(start) = band_start {
        if medians.len() - start >= params.split_height as usize {
            cuts.push(start + params.split_margin as usize);
        }
    }

    let mut out: Vec<u32> = Vec::with_capacity(cuts.len());
    for cut in cuts {
        let Ok(cut) = u32::try_from(cut) else { continue };
        if cut == 0 || cut >= image_height || out.last().is_some_and(|&last| cut <= last) {
            continue;
        }
        out.push(cut);
    }
    out
}

/// Greedily choose page boundaries from the candidates.
///
/// A page window starts at row 0. Each candidate within `page_height` of the
/// window start becomes the tentative end. The first candidate beyond it
/// commits the tentative end, and a new window opens at that candidate with
/// the candidate itself as its tentative end. When the very first window has
/// no tentative end the over-budget candidate is committed instead: the page
/// is longer than the target but nothing is lost. After the walk, a tentative
/// end below the last cut is committed if the rest of the image still exceeds
/// `page_height`.
pub fn select_splits(candidates: &[u32], page_height: u32, image_height: u32) -> Vec<u32> {
    let mut splits: Vec<u32> = Vec::new();
    let mut start = 0u32;
    let mut tentative: Option<u32> = None;

    for &candidate in candidates {
        if candidate <= start {
            continue;
        }
        if candidate - start <= page_height {
            tentative = Some(candidate);
            continue;
        }
        start = candidate;
        match tentative {
            Some(cut) => {
                splits.push(cut);
                tentative = Some(candidate);
            }
            None => splits.push(candidate),
        }
    }

    let last_cut = splits.last().copied().unwrap_or(0);
    if image_height.saturating_sub(last_cut) > page_height {
        if let Some(cut) = tentative.filter(|&cut| cut > last_cut) {
            splits.push(cut);
        }
    }
    splits
}

/// Row ranges of the output pages, top to bottom, without empty slices.
pub fn slice_ranges(splits: &[u32], image_height: u32) -> Vec<Range<u32>> {
    let mut ranges = Vec::with_capacity(splits.len() + 1);
    let mut position = 0;
    for &split in splits {
        let split = split.min(image_height);
        if split > position {
            ranges.push(position..split);
            position = split;
        }
    }
    if position < image_height {
        ranges.push(position..image_height);
    }
    ranges
}
