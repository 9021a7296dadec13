//! TileSource trait for format-agnostic tile access.
//!
//! This module defines the [`TileSource`] capability: the one thing a
//! format-specific reader has to provide so that the region engine can
//! decompose, cache and stitch its pixels. A format is "a `TileSource` plus
//! its [`ImageMetadata`]"; caching and stitching are composed around it rather
//! than inherited.

use std::sync::Arc;

use image::{ColorType, DynamicImage};

use crate::error::TileError;
use crate::region::RegionRequest;

// =============================================================================
// Image Metadata
// =============================================================================

/// Static description of a pyramidal image.
///
/// Owned by the tile source and assumed constant for the life of the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    /// Width of the full-resolution image in pixels
    pub width: u32,

    /// Height of the full-resolution image in pixels
    pub height: u32,

    /// Preferred tile width, in pixels of the level being read
    pub tile_width: u32,

    /// Preferred tile height, in pixels of the level being read
    pub tile_height: u32,

    /// Downsample factor of each pyramid level, finest first
    pub downsamples: Vec<f64>,

    /// Pixel layout of the tiles this source produces
    pub color_type: ColorType,
}

impl ImageMetadata {
    /// Create validated metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidArgument`] if the image or tile size is
    /// zero, the downsample list is empty, or a downsample is not a finite
    /// positive number in non-decreasing order.
    pub fn new(
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
        downsamples: Vec<f64>,
        color_type: ColorType,
    ) -> Result<Self, TileError> {
        if width == 0 || height == 0 {
            return Err(TileError::invalid(format!(
                "image dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(TileError::invalid(format!(
                "tile dimensions must be positive, got {}x{}",
                tile_width, tile_height
            )));
        }
        validate_downsamples(&downsamples)?;

        Ok(Self {
            width,
            height,
            tile_width,
            tile_height,
            downsamples,
            color_type,
        })
    }

    /// Number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.downsamples.len()
    }

    /// Downsample factor of a level, or `None` if out of range.
    pub fn level_downsample(&self, level: usize) -> Option<f64> {
        self.downsamples.get(level).copied()
    }

    /// Pixel dimensions of a level, or `None` if out of range.
    pub fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        let downsample = self.level_downsample(level)?;
        Some((
            scaled(self.width, downsample),
            scaled(self.height, downsample),
        ))
    }

    /// Whether tiles are 8-bit RGB, the only layout the compositing path handles.
    pub fn is_rgb8(&self) -> bool {
        self.color_type == ColorType::Rgb8
    }
}

fn scaled(length: u32, downsample: f64) -> u32 {
    ((length as f64 / downsample).round() as u32).max(1)
}

/// Check a pyramid's downsample list.
///
/// The list must be non-empty, finite, positive and non-decreasing.
pub fn validate_downsamples(downsamples: &[f64]) -> Result<(), TileError> {
    if downsamples.is_empty() {
        return Err(TileError::invalid("downsample list is empty"));
    }
    for (i, &d) in downsamples.iter().enumerate() {
        if !d.is_finite() || d <= 0.0 {
            return Err(TileError::invalid(format!(
                "downsample at level {} must be a finite positive number, got {}",
                i, d
            )));
        }
        if i > 0 && d < downsamples[i - 1] {
            return Err(TileError::invalid(format!(
                "downsamples must be non-decreasing, level {} has {} after {}",
                i,
                d,
                downsamples[i - 1]
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Tile Buffer
// =============================================================================

/// Pixel data tagged with the region that produced it.
///
/// Buffers are shared as `Arc<TileBuffer>` between the cache and every
/// caller holding one. They are never mutated after construction; clone the
/// image to modify it.
#[derive(Debug, Clone)]
pub struct TileBuffer {
    region: RegionRequest,
    image: DynamicImage,
}

impl TileBuffer {
    pub fn new(region: RegionRequest, image: DynamicImage) -> Self {
        Self { region, image }
    }

    /// The region these pixels depict.
    pub fn region(&self) -> &RegionRequest {
        &self.region
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn color_type(&self) -> ColorType {
        self.image.color()
    }

    /// Take the pixels out, cloning only if the buffer is still shared.
    pub fn into_image(self: Arc<Self>) -> DynamicImage {
        match Arc::try_unwrap(self) {
            Ok(buffer) => buffer.image,
            Err(shared) => shared.image.clone(),
        }
    }
}

// =============================================================================
// TileSource Trait
// =============================================================================

/// Format-specific provider of native-resolution tiles.
///
/// `read_tile` is a blocking call and may take arbitrarily long. It must be
/// safe to call concurrently from several threads for different tiles.
///
/// # Example
///
/// ```
/// use image::{ColorType, DynamicImage, RgbImage};
/// use pyramid_region::{ImageMetadata, RegionRequest, TileError, TileSource};
///
/// struct Flat {
///     metadata: ImageMetadata,
/// }
///
/// impl TileSource for Flat {
///     fn metadata(&self) -> &ImageMetadata {
///         &self.metadata
///     }
///
///     fn read_tile(&self, tile: &RegionRequest) -> Result<Option<DynamicImage>, TileError> {
///         let (w, h) = tile.output_dimensions();
///         Ok(Some(DynamicImage::ImageRgb8(RgbImage::new(w, h))))
///     }
/// }
///
/// let metadata = ImageMetadata::new(512, 512, 256, 256, vec![1.0, 2.0], ColorType::Rgb8).unwrap();
/// let source = Flat { metadata };
/// assert_eq!(source.metadata().level_count(), 2);
/// ```
pub trait TileSource: Send + Sync {
    /// Pyramid description for this image.
    fn metadata(&self) -> &ImageMetadata;

    /// Decode one native tile.
    ///
    /// `tile` is expressed in full-resolution coordinates with the downsample
    /// of the pyramid level to read; the returned image should measure
    /// `tile.output_dimensions()`.
    ///
    /// `Ok(None)` means the source has no pixels for this tile. Both `Ok(None)`
    /// and errors are recorded by the cache as unavailable.
    fn read_tile(&self, tile: &RegionRequest) -> Result<Option<DynamicImage>, TileError>;
}

impl<T: TileSource + ?Sized> TileSource for Arc<T> {
    fn metadata(&self) -> &ImageMetadata {
        (**self).metadata()
    }

    fn read_tile(&self, tile: &RegionRequest) -> Result<Option<DynamicImage>, TileError> {
        (**self).read_tile(tile)
    }
}

// =============================================================================
// Tests
// =============================================================================
