//! Region stitching.
//!
//! The [`Stitcher`] answers region requests by decomposing them into native
//! tiles, fetching each tile through the [`TileCache`], and composing the
//! tiles into a buffer of exactly the requested size and resolution.
//!
//! # Paths
//!
//! ```text
//! read_region(request)
//!   1. request itself cached?        -> return cached buffer
//!   2. decompose into tiles          -> none: no data
//!   3. one tile, same downsample,
//!      crop window inside it?        -> fast path: tile as-is, or unscaled crop
//!   4. otherwise                     -> general path: scale + translate every
//!                                       tile into an 8-bit RGB canvas
//! ```
//!
//! Both paths map an output pixel to the tile pixel under its centre: pixel
//! `j` of a tile at downsample `d` covers full-resolution columns
//! `[tile.x + j * d, tile.x + (j + 1) * d)`. The fast path is a crop that
//! starts at the tile pixel under the centre of output pixel 0, so it yields
//! the same pixels the general path would.
//!
//! The general path samples nearest-neighbour at output pixel centres. Tile
//! destination rectangles are obtained by rounding tile edges through the
//! request transform, so adjacent tiles meet exactly. Tiles that could not be
//! read leave black holes instead of failing the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::error::TileError;
use crate::region::RegionRequest;
use crate::slide::{ImageMetadata, TileBuffer, TileSource};

use super::cache::{CachedTile, TileCache};
use super::decompose::decompose_region;

/// Relative tolerance under which two downsamples count as the same resolution.
pub const DOWNSAMPLE_TOLERANCE: f64 = 1e-5;

/// Composes cached tiles from a [`TileSource`] into arbitrary regions.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use image::{DynamicImage, Rgb, RgbImage};
/// use pyramid_region::{ImagePyramidSource, PyramidOptions, RegionRequest, Stitcher};
///
/// let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(600, 400, Rgb([10, 20, 30])));
/// let source = ImagePyramidSource::from_image("memory", image, PyramidOptions::default()).unwrap();
/// let stitcher = Stitcher::new(Arc::new(source));
///
/// let request = RegionRequest::on_default_plane(100, 100, 400, 200, 2.0).unwrap();
/// let region = stitcher.read_region(&request).unwrap().unwrap();
/// assert_eq!((region.width(), region.height()), (200, 100));
/// ```
pub struct Stitcher<S: ?Sized> {
    source: Arc<S>,
    cache: Arc<TileCache>,
}

impl<S: TileSource + ?Sized> Stitcher<S> {
    /// Create a stitcher with its own default-sized cache.
    pub fn new(source: Arc<S>) -> Self {
        Self::with_cache(source, Arc::new(TileCache::new()))
    }

    /// Create a stitcher that uses an explicitly sized, possibly shared, cache.
    pub fn with_cache(source: Arc<S>, cache: Arc<TileCache>) -> Self {
        Self { source, cache }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn metadata(&self) -> &ImageMetadata {
        self.source.metadata()
    }

    /// Read a region at its requested resolution.
    ///
    /// Returns `Ok(None)` when there is no data for the region: it lies
    /// outside the image, or it is served by a single tile that could not be
    /// read.
    ///
    /// A request is served without resampling when it decomposes into one
    /// tile at the requested downsample *and* its output window lies inside
    /// that tile's pixels. A request hanging over the image edge, or whose
    /// rounded window runs one pixel past the tile, is composited instead,
    /// so the uncovered part comes back blank (and non-RGB data fails).
    ///
    /// # Errors
    ///
    /// - [`TileError::InvalidArgument`] if the pyramid has no levels
    /// - [`TileError::UnsupportedPixelLayout`] if compositing is needed for
    ///   data that is not 8-bit RGB
    pub fn read_region(
        &self,
        request: &RegionRequest,
    ) -> Result<Option<Arc<TileBuffer>>, TileError> {
        self.read(request, None)
    }

    /// Like [`read_region`](Self::read_region), checking `interrupt` before
    /// every tile fetch.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Interrupted`] as soon as the flag is seen set.
    /// Tiles fetched up to that point stay cached.
    pub fn read_region_interruptible(
        &self,
        request: &RegionRequest,
        interrupt: &AtomicBool,
    ) -> Result<Option<Arc<TileBuffer>>, TileError> {
        self.read(request, Some(interrupt))
    }

    fn read(
        &self,
        request: &RegionRequest,
        interrupt: Option<&AtomicBool>,
    ) -> Result<Option<Arc<TileBuffer>>, TileError> {
        // Requests that are themselves tiles come straight from the cache
        if let Some(cached) = self.cache.get(request) {
            debug!(region = %request, "Region served from cache");
            return Ok(cached.buffer().cloned());
        }

        let tiles = decompose_region(request, self.metadata())?;
        if tiles.is_empty() {
            debug!(region = %request, "Region outside image");
            return Ok(None);
        }

        if let [tile] = tiles.as_slice() {
            let window = same_downsample(tile.downsample(), request.downsample())
                .then(|| crop_window(tile, request))
                .flatten();
            if let Some(window) = window {
                check_interrupt(interrupt)?;
                debug!(region = %request, tile = %tile, "Single-tile fast path");
                let cached = self.cache.get_or_load(tile, self.source.as_ref());
                return Ok(cached
                    .buffer()
                    .map(|buffer| crop_unscaled(buffer, request, window)));
            }
        }

        if !self.metadata().is_rgb8() {
            return Err(TileError::UnsupportedPixelLayout {
                color_type: self.metadata().color_type,
            });
        }

        debug!(region = %request, tiles = tiles.len(), "Compositing region");
        let mut fetched = Vec::with_capacity(tiles.len());
        for tile in &tiles {
            check_interrupt(interrupt)?;
            fetched.push(self.cache.get_or_load(tile, self.source.as_ref()));
        }

        compose(request, &fetched).map(|buffer| Some(Arc::new(buffer)))
    }
}

fn check_interrupt(interrupt: Option<&AtomicBool>) -> Result<(), TileError> {
    match interrupt {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(TileError::Interrupted),
        _ => Ok(()),
    }
}

/// Whether two downsamples are equal within [`DOWNSAMPLE_TOLERANCE`].
pub fn same_downsample(a: f64, b: f64) -> bool {
    (a - b).abs() <= DOWNSAMPLE_TOLERANCE * a.abs().max(b.abs())
}

/// Pixel rectangle `(left, top, width, height)` of `request` inside `tile`.
///
/// The origin is the tile pixel under the centre of the first output pixel.
/// `None` unless the request lies inside the tile and the whole window fits
/// in the tile's pixels.
fn crop_window(tile: &RegionRequest, request: &RegionRequest) -> Option<(u32, u32, u32, u32)> {
    if !tile.contains(request) {
        return None;
    }

    let downsample = tile.downsample();
    let left = ((request.x() - tile.x()) as f64 / downsample + 0.5).floor() as u64;
    let top = ((request.y() - tile.y()) as f64 / downsample + 0.5).floor() as u64;
    let (width, height) = request.output_dimensions();
    let (tile_width, tile_height) = tile.output_dimensions();

    let fits = left + width as u64 <= tile_width as u64 && top + height as u64 <= tile_height as u64;
    fits.then_some((left as u32, top as u32, width, height))
}

/// Cut `request` out of a tile at the tile's own resolution.
///
/// The tile is returned as-is when it covers exactly the requested area.
fn crop_unscaled(
    tile: &Arc<TileBuffer>,
    request: &RegionRequest,
    (left, top, width, height): (u32, u32, u32, u32),
) -> Arc<TileBuffer> {
    if tile.region().same_bounds(request) {
        return Arc::clone(tile);
    }

    // Sources may hand back fewer pixels than the tile extent promises
    let image = tile.image();
    let left = left.min(image.width().saturating_sub(1));
    let top = top.min(image.height().saturating_sub(1));
    let width = width.min(image.width() - left);
    let height = height.min(image.height() - top);

    Arc::new(TileBuffer::new(
        *request,
        image.crop_imm(left, top, width, height),
    ))
}

/// Draw fetched tiles into an RGB canvas sized to `request`.
///
/// Tiles must be non-overlapping and 8-bit RGB; unavailable tiles are skipped.
fn compose(request: &RegionRequest, tiles: &[CachedTile]) -> Result<TileBuffer, TileError> {
    let (out_width, out_height) = request.output_dimensions();
    let mut canvas = RgbImage::new(out_width, out_height);
    let downsample = request.downsample();

    // Full-resolution offset from the request origin to output pixel space
    let to_output = |offset: i64| -> i64 { (offset as f64 / downsample).round() as i64 };

    for tile in tiles {
        let Some(buffer) = tile.buffer() else {
            continue;
        };
        let pixels = buffer
            .image()
            .as_rgb8()
            .ok_or(TileError::UnsupportedPixelLayout {
                color_type: buffer.color_type(),
            })?;
        if pixels.width() == 0 || pixels.height() == 0 {
            continue;
        }
        let region = buffer.region();

        let x0 = to_output(region.x() - request.x()).clamp(0, out_width as i64);
        let x1 = to_output(region.right() - request.x()).clamp(0, out_width as i64);
        let y0 = to_output(region.y() - request.y()).clamp(0, out_height as i64);
        let y1 = to_output(region.bottom() - request.y()).clamp(0, out_height as i64);
        if x0 >= x1 || y0 >= y1 {
            continue;
        }

        // Tile pixel j covers [region.x + j * d, region.x + (j + 1) * d)
        let scale = 1.0 / region.downsample();
        let max_x = pixels.width() as i64 - 1;
        let max_y = pixels.height() as i64 - 1;

        for oy in y0..y1 {
            let full_y = request.y() as f64 + (oy as f64 + 0.5) * downsample;
            let sy = (((full_y - region.y() as f64) * scale).floor() as i64).clamp(0, max_y);
            for ox in x0..x1 {
                let full_x = request.x() as f64 + (ox as f64 + 0.5) * downsample;
                let sx =
                    (((full_x - region.x() as f64) * scale).floor() as i64).clamp(0, max_x);
                canvas.put_pixel(ox as u32, oy as u32, *pixels.get_pixel(sx as u32, sy as u32));
            }
        }
    }

    Ok(TileBuffer::new(*request, DynamicImage::ImageRgb8(canvas)))
}

// =============================================================================
// Tests
// =============================================================================
