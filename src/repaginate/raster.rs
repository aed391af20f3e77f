//! Raster stages: stacking rendered pages and cutting the stack apart.

use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage, RgbImage, imageops};
use std::ops::Range;

/// Stack pages top to bottom on an opaque white canvas as wide as the widest
/// page. Pages are left-aligned; transparency is composited onto white.
pub fn flatten_pages(pages: &[DynamicImage]) -> RgbImage {
    let width = pages.iter().map(DynamicImage::width).max().unwrap_or(0);
    let height = pages.iter().map(DynamicImage::height).sum();

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut offset = 0i64;
    for page in pages {
        imageops::overlay(&mut canvas, &page.to_rgba8(), 0, offset);
        offset += i64::from(page.height());
    }
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

/// Grayscale with ITU-R 601-2 luma weights in 16-bit fixed point.
///
/// `image::imageops::grayscale` weighs by Rec. 709, which scores colored ink
/// differently against the blank-row threshold.
pub fn to_luma(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let weighted = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471;
        Luma([((weighted + 0x8000) >> 16) as u8])
    })
}

/// Cut full-width horizontal bands out of `image`.
pub fn slice_image(image: &RgbImage, ranges: &[Range<u32>]) -> Vec<RgbImage> {
    ranges
        .iter()
        .map(|r| imageops::crop_imm(image, 0, r.start, image.width(), r.end - r.start).to_image())
        .collect()
}
