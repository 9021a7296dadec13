//! Region read integration tests.
//!
//! Tests verify:
//! - Output size and pixel content across levels and paths
//! - Clipping at the image bounds
//! - Holes for unreadable tiles
//! - Pixel layout restrictions
//! - Interruption

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::Rgb;

use pyramid_region::{decompose_region, RegionRequest, Stitcher, TileCache, TileError, TileSource};

use super::test_utils::{
    pattern, pattern_pyramid, region, standard_source, GraySource, SyntheticSource,
};

const BLANK: Rgb<u8> = Rgb([0, 0, 0]);

// =============================================================================
// Corner Scenario
// =============================================================================

#[test]
fn test_region_overlapping_image_corner() {
    let source = standard_source();
    let stitcher = Stitcher::with_cache(Arc::clone(&source), Arc::new(TileCache::with_capacity(64)));

    let request = region(900, 900, 200, 200, 1.0);
    let tiles = decompose_region(&request, source.metadata()).unwrap();
    assert_eq!(tiles, vec![region(768, 768, 232, 232, 1.0)]);

    let out = stitcher.read_region(&request).unwrap().unwrap();
    assert_eq!((out.width(), out.height()), (200, 200));

    let rgb = out.image().as_rgb8().unwrap();
    // Inside the image: source pixels
    for (x, y) in [(0u32, 0u32), (50, 99), (99, 0), (99, 99)] {
        assert_eq!(rgb.get_pixel(x, y), &pattern(900 + x as i64, 900 + y as i64));
    }
    // Outside the image: blank
    for (x, y) in [(100u32, 0u32), (0, 100), (199, 199), (150, 20)] {
        assert_eq!(rgb.get_pixel(x, y), &BLANK, "pixel ({}, {})", x, y);
    }
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_output_size_follows_downsample() {
    let stitcher = Stitcher::new(standard_source());

    let cases = [
        (region(0, 0, 1000, 1000, 1.0), (1000, 1000)),
        (region(0, 0, 1000, 1000, 4.0), (250, 250)),
        (region(0, 0, 1000, 1000, 16.0), (63, 63)),
        (region(100, 200, 300, 150, 3.0), (100, 50)),
        (region(0, 0, 999, 999, 2.0), (500, 500)),
    ];

    for (request, expected) in cases {
        let out = stitcher.read_region(&request).unwrap().unwrap();
        assert_eq!((out.width(), out.height()), expected, "{}", request);
    }
}

#[test]
fn test_closest_level_tiles_requested() {
    let source = standard_source();
    let stitcher = Stitcher::new(Arc::clone(&source));

    // 6 is closer (in ratio) to 4 than to 16
    stitcher.read_region(&region(0, 0, 1000, 1000, 6.0)).unwrap();
    let requested = source.requested_tiles();
    assert!(!requested.is_empty());
    assert!(requested.iter().all(|t| t.downsample() == 4.0));
}

#[test]
fn test_downsampled_pixels_sample_source() {
    let source = standard_source();
    let stitcher = Stitcher::new(source);

    let out = stitcher
        .read_region(&region(0, 0, 1000, 1000, 4.0))
        .unwrap()
        .unwrap();
    let rgb = out.image().as_rgb8().unwrap();

    // Output pixel (i, j) covers full-resolution [4i, 4i + 4); its centre is 4i + 2
    for (i, j) in [(0u32, 0u32), (10, 20), (249, 249), (128, 64)] {
        assert_eq!(
            rgb.get_pixel(i, j),
            &pattern(4 * i as i64 + 2, 4 * j as i64 + 2),
            "pixel ({}, {})",
            i,
            j
        );
    }
}

#[test]
fn test_stitching_across_tile_seams() {
    let stitcher = Stitcher::new(standard_source());
    let out = stitcher
        .read_region(&region(200, 200, 400, 400, 1.0))
        .unwrap()
        .unwrap();
    let rgb = out.image().as_rgb8().unwrap();

    for y in 0..400u32 {
        for x in [0u32, 55, 56, 311, 312, 399] {
            assert_eq!(
                rgb.get_pixel(x, y),
                &pattern(200 + x as i64, 200 + y as i64),
                "pixel ({}, {})",
                x,
                y
            );
        }
    }
}

#[test]
fn test_image_pyramid_source_region() {
    let source = Arc::new(pattern_pyramid(800, 600));
    let stitcher = Stitcher::new(source);

    let out = stitcher
        .read_region(&region(250, 250, 300, 100, 1.0))
        .unwrap()
        .unwrap();
    let rgb = out.image().as_rgb8().unwrap();
    assert_eq!(rgb.dimensions(), (300, 100));
    assert_eq!(rgb.get_pixel(0, 0), &pattern(250, 250));
    assert_eq!(rgb.get_pixel(299, 99), &pattern(549, 349));
}

// =============================================================================
// Fast Path
// =============================================================================

#[test]
fn test_tile_aligned_request_shares_cached_buffer() {
    let cache = Arc::new(TileCache::with_capacity(16));
    let stitcher = Stitcher::with_cache(standard_source(), Arc::clone(&cache));

    let tile = region(256, 512, 256, 256, 1.0);
    let first = stitcher.read_region(&tile).unwrap().unwrap();
    let second = stitcher.read_region(&tile).unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, cache.peek(&tile).unwrap().buffer().unwrap()));
}

#[test]
fn test_gray_fast_path_allowed() {
    let stitcher = Stitcher::new(Arc::new(GraySource::new(600, 600, 256)));
    let out = stitcher
        .read_region(&region(10, 10, 50, 50, 1.0))
        .unwrap()
        .unwrap();
    assert_eq!(out.image().as_luma8().unwrap().get_pixel(0, 0).0, [128]);
}

#[test]
fn test_gray_compositing_rejected() {
    let stitcher = Stitcher::new(Arc::new(GraySource::new(600, 600, 256)));
    let result = stitcher.read_region(&region(200, 200, 200, 200, 1.0));
    assert!(matches!(
        result,
        Err(TileError::UnsupportedPixelLayout { .. })
    ));
}

// =============================================================================
// No Data and Holes
// =============================================================================

#[test]
fn test_region_outside_image_has_no_data() {
    let source = standard_source();
    let stitcher = Stitcher::new(Arc::clone(&source));

    for request in [
        region(1000, 0, 100, 100, 1.0),
        region(0, 1000, 100, 100, 1.0),
        region(-200, -200, 200, 200, 1.0),
        region(5000, 5000, 64, 64, 16.0),
    ] {
        assert!(stitcher.read_region(&request).unwrap().is_none(), "{}", request);
    }
    assert_eq!(source.read_count(), 0);
}

#[test]
fn test_failing_tile_leaves_hole() {
    let source = Arc::new(
        SyntheticSource::new(1000, 1000, 256, vec![1.0, 4.0, 16.0]).with_failing_tile(256, 256),
    );
    let stitcher = Stitcher::new(Arc::clone(&source));

    let out = stitcher
        .read_region(&region(0, 0, 768, 768, 1.0))
        .unwrap()
        .unwrap();
    let rgb = out.image().as_rgb8().unwrap();

    assert_eq!(rgb.get_pixel(100, 100), &pattern(100, 100));
    assert_eq!(rgb.get_pixel(300, 300), &BLANK);
    assert_eq!(rgb.get_pixel(600, 300), &pattern(600, 300));
    assert_eq!(source.read_count(), 9);

    // The failure is cached like any tile
    stitcher.read_region(&region(300, 300, 10, 10, 1.0)).unwrap();
    assert_eq!(source.read_count(), 9);
}

#[test]
fn test_failing_single_tile_has_no_data() {
    let source = Arc::new(
        SyntheticSource::new(1000, 1000, 256, vec![1.0]).with_failing_tile(0, 0),
    );
    let stitcher = Stitcher::new(source);
    assert!(stitcher
        .read_region(&region(5, 5, 100, 100, 1.0))
        .unwrap()
        .is_none());
}

// =============================================================================
// Repeatability and Planes
// =============================================================================

#[test]
fn test_repeated_reads_are_identical_and_cached() {
    let source = standard_source();
    let stitcher = Stitcher::new(Arc::clone(&source));
    let request = region(130, 70, 650, 420, 2.5);

    let first = stitcher.read_region(&request).unwrap().unwrap();
    let reads = source.read_count();
    let second = stitcher.read_region(&request).unwrap().unwrap();

    assert_eq!(first.image().to_rgb8(), second.image().to_rgb8());
    assert_eq!(source.read_count(), reads);
}

#[test]
fn test_planes_cached_separately() {
    let source = standard_source();
    let stitcher = Stitcher::new(Arc::clone(&source));

    let plane_a = RegionRequest::new(0, 0, 100, 100, 1.0, 0, 0).unwrap();
    let plane_b = RegionRequest::new(0, 0, 100, 100, 1.0, 1, 0).unwrap();

    stitcher.read_region(&plane_a).unwrap();
    stitcher.read_region(&plane_b).unwrap();
    assert_eq!(source.read_count(), 2);
    assert!(source.requested_tiles().iter().any(|t| t.z() == 1));
}

// =============================================================================
// Interruption
// =============================================================================

#[test]
fn test_interrupted_read_keeps_cache_consistent() {
    let source = standard_source();
    let cache = Arc::new(TileCache::with_capacity(64));
    let stitcher = Stitcher::with_cache(Arc::clone(&source), Arc::clone(&cache));

    let interrupt = AtomicBool::new(true);
    let request = region(0, 0, 1000, 1000, 1.0);
    assert!(matches!(
        stitcher.read_region_interruptible(&request, &interrupt),
        Err(TileError::Interrupted)
    ));
    assert_eq!(source.read_count(), 0);
    assert!(cache.is_empty());

    // Without the flag the same stitcher completes
    let idle = AtomicBool::new(false);
    let out = stitcher
        .read_region_interruptible(&request, &idle)
        .unwrap()
        .unwrap();
    assert_eq!(out.width(), 1000);
    assert_eq!(cache.len(), 16);
}
