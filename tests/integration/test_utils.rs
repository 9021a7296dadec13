//! Test utilities for integration tests.
//!
//! This module provides a synthetic tile source with read tracking and failure
//! injection, plus helpers for building images and checking encoded output.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ColorType, DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use pyramid_region::{
    ImageMetadata, ImagePyramidSource, PyramidOptions, RegionRequest, TileError, TileSource,
};

// =============================================================================
// Synthetic Pattern
// =============================================================================

/// Pixel value of the synthetic image at full-resolution coordinates.
///
/// Non-zero everywhere, so blank (black) output pixels are unambiguous.
pub fn pattern(x: i64, y: i64) -> Rgb<u8> {
    Rgb([
        (x % 250) as u8 + 1,
        (y % 250) as u8 + 1,
        ((x / 16 + y / 16) % 250) as u8 + 1,
    ])
}

/// The full-resolution synthetic image.
pub fn pattern_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| pattern(x as i64, y as i64))
}

// =============================================================================
// Synthetic Tile Source
// =============================================================================

/// A tile source rendering [`pattern`] on demand.
///
/// Level pixels sample the pattern at their centres, so every level is an
/// exact nearest-neighbour reduction of the full-resolution image. Reads are
/// counted and recorded, and individual tiles can be made to fail.
pub struct SyntheticSource {
    metadata: ImageMetadata,
    reads: AtomicUsize,
    requested: Mutex<Vec<RegionRequest>>,
    failing: HashSet<(i64, i64)>,
    delay: Option<Duration>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, tile_size: u32, downsamples: Vec<f64>) -> Self {
        let metadata = ImageMetadata::new(
            width,
            height,
            tile_size,
            tile_size,
            downsamples,
            ColorType::Rgb8,
        )
        .unwrap();

        Self {
            metadata,
            reads: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            delay: None,
        }
    }

    /// Make the tile whose origin is `(x, y)` fail on every read.
    pub fn with_failing_tile(mut self, x: i64, y: i64) -> Self {
        self.failing.insert((x, y));
        self
    }

    /// Sleep before answering every read.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn requested_tiles(&self) -> Vec<RegionRequest> {
        self.requested.lock().unwrap().clone()
    }
}

impl TileSource for SyntheticSource {
    fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    fn read_tile(&self, tile: &RegionRequest) -> Result<Option<DynamicImage>, TileError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(*tile);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.failing.contains(&(tile.x(), tile.y())) {
            return Err(TileError::SourceRead {
                message: format!("injected failure at {}", tile),
            });
        }

        let ds = tile.downsample();
        let (width, height) = tile.output_dimensions();
        let image = RgbImage::from_fn(width, height, |px, py| {
            let fx = tile.x() + ((px as f64 + 0.5) * ds) as i64;
            let fy = tile.y() + ((py as f64 + 0.5) * ds) as i64;
            pattern(fx, fy)
        });
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }
}

/// A source whose tiles are 8-bit grayscale.
pub struct GraySource {
    metadata: ImageMetadata,
}

impl GraySource {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            metadata: ImageMetadata::new(
                width,
                height,
                tile_size,
                tile_size,
                vec![1.0, 4.0],
                ColorType::L8,
            )
            .unwrap(),
        }
    }
}

impl TileSource for GraySource {
    fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    fn read_tile(&self, tile: &RegionRequest) -> Result<Option<DynamicImage>, TileError> {
        let (width, height) = tile.output_dimensions();
        Ok(Some(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            width,
            height,
            Luma([128]),
        ))))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// The 1000x1000 pyramid with levels 1, 4 and 16 and 256px tiles.
pub fn standard_source() -> Arc<SyntheticSource> {
    Arc::new(SyntheticSource::new(1000, 1000, 256, vec![1.0, 4.0, 16.0]))
}

/// An in-memory image pyramid built from [`pattern_image`].
pub fn pattern_pyramid(width: u32, height: u32) -> ImagePyramidSource {
    let image = DynamicImage::ImageRgb8(pattern_image(width, height));
    ImagePyramidSource::from_image("pattern", image, PyramidOptions::default()).unwrap()
}

pub fn region(x: i64, y: i64, width: u32, height: u32, downsample: f64) -> RegionRequest {
    RegionRequest::on_default_plane(x, y, width, height, downsample).unwrap()
}

/// Check if data is a valid JPEG (starts with SOI, ends with EOI).
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4
        && data[0] == 0xFF
        && data[1] == 0xD8
        && data[data.len() - 2] == 0xFF
        && data[data.len() - 1] == 0xD9
}

/// Check if data starts with the PNG signature.
pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}
