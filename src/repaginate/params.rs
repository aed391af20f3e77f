//! Parameter types for repagination.
//!
//! - [`SplitParams`]: whitespace-gap detection thresholds. Deserialized
//!   straight from `[conversion.splits]`.
//! - [`PageGeometry`]: rendering resolution and target physical page height.

use serde::{Deserialize, Serialize};

/// Millimetres per inch.
const MM_PER_INCH: f64 = 25.4;

/// Thresholds of the blank-band detector.
///
/// Row intensities live on a `0..=25500` scale (8-bit gray × 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitParams {
    /// Rows per sliding median window.
    pub median_window: usize,
    /// Minimum windowed median for a row to count as blank.
    pub median_threshold: u32,
    /// Minimum run of blank rows that qualifies as a gap.
    pub split_height: u32,
    /// Distance kept from the end of a gap when cutting inside it.
    pub split_margin: u32,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            median_window: 10,
            median_threshold: 25050,
            split_height: 30,
            split_margin: 30,
        }
    }
}

/// Output page geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Rasterization resolution, also embedded in the output document.
    pub dpi: f32,
    /// Target page height in millimetres.
    pub height_mm: f32,
}

impl PageGeometry {
    /// Target page height in pixels at `dpi`, rounded down.
    pub fn page_height_px(&self) -> u32 {
        (f64::from(self.height_mm) * f64::from(self.dpi) / MM_PER_INCH).floor() as u32
    }

    /// PDF points (1/72 in) covered by `px` pixels at `dpi`.
    pub fn px_to_points(&self, px: u32) -> f32 {
        (f64::from(px) * 72.0 / f64::from(self.dpi)) as f32
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            dpi: 300.0,
            height_mm: 297.0,
        }
    }
}
