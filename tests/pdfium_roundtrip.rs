//! Repagination through a real PDFium.
//!
//! Needs a libpdfium shared library in the working directory or on the
//! system library path.
//!
//! Run with: `cargo test --test pdfium_roundtrip -- --ignored`

use image::{Rgb, RgbImage};
use scribeshelf::repaginate::{
    PageGeometry, PdfBackend, PdfiumBackend, RepaginateOptions, repaginate,
};
use tempfile::TempDir;

/// At 72 dpi one pixel is one PDF point, so sizes survive the round trip.
const DPI: f32 = 72.0;

/// A white page with black rows in `blocks`.
fn page_with_blocks(width: u32, height: u32, blocks: &[(u32, u32)]) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        if blocks.iter().any(|&(start, end)| (start..end).contains(&y)) {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

fn backend() -> PdfiumBackend {
    PdfiumBackend::new(None).expect("libpdfium must be available for this test")
}

#[test]
#[ignore] // Requires libpdfium
fn written_pages_render_back_at_same_size() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("pages.pdf");
    let backend = backend();
    let pages = vec![
        page_with_blocks(200, 300, &[(10, 100)]),
        page_with_blocks(160, 400, &[(50, 80)]),
    ];

    backend.write_pages(&pages, DPI, &path).unwrap();
    let rendered = backend.render_pages(&path, DPI).unwrap();

    assert_eq!(rendered.len(), 2);
    assert_eq!((rendered[0].width(), rendered[0].height()), (200, 300));
    assert_eq!((rendered[1].width(), rendered[1].height()), (160, 400));
}

#[test]
#[ignore] // Requires libpdfium
fn long_scan_is_cut_into_budget_sized_pages() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("scan.pdf");
    let target = tmp.path().join("out.pdf");
    let backend = backend();

    // Five 150-row blocks separated by 60-row gaps, split over two device pages.
    let first = page_with_blocks(200, 600, &[(0, 150), (210, 360), (420, 570)]);
    let second = page_with_blocks(200, 400, &[(30, 180), (240, 390)]);
    backend.write_pages(&[first, second], DPI, &source).unwrap();

    let options = RepaginateOptions {
        // floor(120 * 72 / 25.4) = 340 rows per page
        geometry: PageGeometry {
            dpi: DPI,
            height_mm: 120.0,
        },
        ..RepaginateOptions::default()
    };
    let summary = repaginate(&backend, &source, &target, &options).unwrap();

    assert_eq!(summary.source_pages, 2);
    assert!(summary.output_pages >= 3, "{summary:?}");

    let output = backend.render_pages(&target, DPI).unwrap();
    assert_eq!(output.len(), summary.output_pages);
    let total: u32 = output.iter().map(|p| p.height()).sum();
    assert!((998..=1002).contains(&total), "total height {total}");
    // A page runs at most one block and gap past the budget.
    for page in &output {
        assert!(page.height() <= 340 + 210 + 2, "page of {} rows", page.height());
    }
}
