//! Tile source backed by a single decoded image file.
//!
//! The image is decoded once with the `image` crate and an in-memory pyramid
//! is built for the configured downsamples. Tiles are served by cropping the
//! matching level. This keeps every image the `image` crate can decode
//! (JPEG, PNG) servable through the region engine without a format-specific
//! reader.

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, info};

use crate::error::{SourceError, TileError};
use crate::region::RegionRequest;

use super::source::{validate_downsamples, ImageMetadata, TileSource};

/// Default edge length of a tile in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default pyramid downsamples.
pub const DEFAULT_DOWNSAMPLES: [f64; 3] = [1.0, 4.0, 16.0];

// =============================================================================
// Pyramid Options
// =============================================================================

/// Layout of the pyramid built for an image.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidOptions {
    pub tile_width: u32,
    pub tile_height: u32,
    pub downsamples: Vec<f64>,
}

impl Default for PyramidOptions {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            downsamples: DEFAULT_DOWNSAMPLES.to_vec(),
        }
    }
}

// =============================================================================
// Image Pyramid Source
// =============================================================================

/// In-memory pyramid serving tiles from a decoded image.
pub struct ImagePyramidSource {
    /// Identifier used in logs (usually the file path)
    id: String,

    /// One decoded image per pyramid level
    levels: Vec<DynamicImage>,

    metadata: ImageMetadata,
}

impl ImagePyramidSource {
    /// Decode an image file and build its pyramid.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, cannot be
    /// decoded, or the pyramid options are invalid.
    pub fn open(path: impl AsRef<Path>, options: PyramidOptions) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let id = path.display().to_string();

        if !path.exists() {
            return Err(SourceError::NotFound(id));
        }

        let reader = image::ImageReader::open(path)
            .map_err(|e| SourceError::Io(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| SourceError::Io(e.to_string()))?;
        let image = reader
            .decode()
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        Self::from_image(id, image, options)
    }

    /// Build a pyramid from an already decoded image.
    pub fn from_image(
        id: impl Into<String>,
        image: DynamicImage,
        options: PyramidOptions,
    ) -> Result<Self, SourceError> {
        let id = id.into();
        validate_downsamples(&options.downsamples)?;

        let metadata = ImageMetadata::new(
            image.width(),
            image.height(),
            options.tile_width,
            options.tile_height,
            options.downsamples,
            image.color(),
        )?;

        let mut levels = Vec::with_capacity(metadata.level_count());
        for level in 0..metadata.level_count() {
            let (width, height) = metadata
                .level_dimensions(level)
                .ok_or_else(|| TileError::invalid(format!("missing level {}", level)))?;

            let pixels = if width == image.width() && height == image.height() {
                image.clone()
            } else {
                image.resize_exact(width, height, FilterType::Triangle)
            };
            debug!(
                source = %id,
                level,
                width,
                height,
                "Built pyramid level"
            );
            levels.push(pixels);
        }

        info!(
            source = %id,
            width = metadata.width,
            height = metadata.height,
            levels = metadata.level_count(),
            "Opened image pyramid"
        );

        Ok(Self {
            id,
            levels,
            metadata,
        })
    }

    /// Identifier of this source.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn level_for(&self, downsample: f64) -> Option<usize> {
        self.metadata
            .downsamples
            .iter()
            .position(|d| d.to_bits() == downsample.to_bits())
    }
}

impl TileSource for ImagePyramidSource {
    fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    fn read_tile(&self, tile: &RegionRequest) -> Result<Option<DynamicImage>, TileError> {
        let level = self
            .level_for(tile.downsample())
            .ok_or_else(|| TileError::SourceRead {
                message: format!(
                    "{}: no pyramid level with downsample {}",
                    self.id,
                    tile.downsample()
                ),
            })?;
        let pixels = &self.levels[level];

        if tile.x() < 0 || tile.y() < 0 {
            return Ok(None);
        }

        let downsample = tile.downsample();
        let left = (tile.x() as f64 / downsample) as u32;
        let top = (tile.y() as f64 / downsample) as u32;
        if left >= pixels.width() || top >= pixels.height() {
            return Ok(None);
        }

        let (width, height) = tile.output_dimensions();
        let width = width.min(pixels.width() - left);
        let height = height.min(pixels.height() - top);

        Ok(Some(pixels.crop_imm(left, top, width, height)))
    }
}

// =============================================================================
// Tests
// =============================================================================
