//! Region service.
//!
//! The RegionService is the entry point used by the HTTP layer and the render
//! command. It orchestrates:
//! - Query validation
//! - Region stitching through the shared tile cache
//! - Encoding to the requested output format
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        RegionService                            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_region()                         │    │
//! │  │  1. Validate query    3. Stitch region from tiles       │    │
//! │  │  2. Build request     4. Encode in output format        │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │                    │                         │                  │
//! │                    ▼                         ▼                  │
//! │    ┌──────────────────────────┐    ┌──────────────────┐         │
//! │    │ Stitcher (+ TileCache)   │    │  RegionEncoder   │         │
//! │    └──────────────────────────┘    └──────────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All methods block on tile reads and encoding; async callers should run
//! them on a blocking thread.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::TileError;
use crate::region::RegionRequest;
use crate::slide::{ImageMetadata, TileSource};

use super::cache::{CacheStats, TileCache};
use super::encoder::{is_valid_quality, OutputFormat, RegionEncoder, DEFAULT_JPEG_QUALITY};
use super::stitch::Stitcher;

/// Default limit on output pixels per region (64 megapixels).
pub const DEFAULT_MAX_REGION_PIXELS: u64 = 64 * 1024 * 1024;

// =============================================================================
// Region Query
// =============================================================================

/// Parameters of a region read, as received from a client.
#[derive(Debug, Clone)]
pub struct RegionQuery {
    /// Left edge in full-resolution pixels
    pub x: i64,

    /// Top edge in full-resolution pixels
    pub y: i64,

    /// Width in full-resolution pixels
    pub width: u32,

    /// Height in full-resolution pixels
    pub height: u32,

    /// Full-resolution pixels per output pixel
    pub downsample: f64,

    /// Focal plane
    pub z: u32,

    /// Timepoint
    pub t: u32,

    /// Output encoding
    pub format: OutputFormat,

    /// JPEG quality (1-100, defaults to 80)
    pub quality: u8,
}

impl RegionQuery {
    /// Query a full-resolution-aligned region on plane (0, 0) as JPEG at the
    /// default quality.
    pub fn new(x: i64, y: i64, width: u32, height: u32, downsample: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            downsample,
            z: 0,
            t: 0,
            format: OutputFormat::Jpeg,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_plane(mut self, z: u32, t: u32) -> Self {
        self.z = z;
        self.t = t;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// The region request described by this query.
    pub fn to_request(&self) -> Result<RegionRequest, TileError> {
        RegionRequest::new(
            self.x,
            self.y,
            self.width,
            self.height,
            self.downsample,
            self.z,
            self.t,
        )
    }
}

// =============================================================================
// Region Response
// =============================================================================

/// An encoded region.
#[derive(Debug, Clone)]
pub struct RegionResponse {
    /// The encoded image
    pub data: Bytes,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Encoding of `data`
    pub format: OutputFormat,
}

// =============================================================================
// Region Service
// =============================================================================

/// Service for reading and encoding regions of one tile source.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use image::{DynamicImage, RgbImage};
/// use pyramid_region::{ImagePyramidSource, PyramidOptions, RegionQuery, RegionService};
///
/// let image = DynamicImage::ImageRgb8(RgbImage::new(512, 512));
/// let source = ImagePyramidSource::from_image("memory", image, PyramidOptions::default()).unwrap();
/// let service = RegionService::new(Arc::new(source));
///
/// let response = service.get_region(&RegionQuery::new(0, 0, 256, 128, 2.0)).unwrap().unwrap();
/// assert_eq!((response.width, response.height), (128, 64));
/// ```
pub struct RegionService<S: TileSource + ?Sized> {
    stitcher: Stitcher<S>,
    encoder: RegionEncoder,
    max_region_pixels: u64,
}

impl<S: TileSource + ?Sized> RegionService<S> {
    /// Create a service with its own default-sized tile cache.
    pub fn new(source: Arc<S>) -> Self {
        Self::with_stitcher(Stitcher::new(source))
    }

    /// Create a service over an explicitly configured, possibly shared, cache.
    pub fn with_cache(source: Arc<S>, cache: Arc<TileCache>) -> Self {
        Self::with_stitcher(Stitcher::with_cache(source, cache))
    }

    fn with_stitcher(stitcher: Stitcher<S>) -> Self {
        Self {
            stitcher,
            encoder: RegionEncoder::new(),
            max_region_pixels: DEFAULT_MAX_REGION_PIXELS,
        }
    }

    /// Limit the output size of a single region, in pixels.
    ///
    /// Larger queries fail with [`TileError::InvalidArgument`] before any
    /// tile is read.
    pub fn with_max_region_pixels(mut self, max_pixels: u64) -> Self {
        self.max_region_pixels = max_pixels;
        self
    }

    pub fn max_region_pixels(&self) -> u64 {
        self.max_region_pixels
    }

    /// Read and encode a region.
    ///
    /// Returns `Ok(None)` when the region has no data.
    ///
    /// # Errors
    ///
    /// - [`TileError::InvalidQuality`] if the quality is outside 1-100
    /// - [`TileError::InvalidArgument`] for non-positive dimensions or downsample,
    ///   or an output larger than [`max_region_pixels`](Self::max_region_pixels)
    /// - any error raised by [`Stitcher::read_region`] or the encoder
    pub fn get_region(&self, query: &RegionQuery) -> Result<Option<RegionResponse>, TileError> {
        self.get_region_with(query, None)
    }

    /// Like [`get_region`](Self::get_region), abandoning the read with
    /// [`TileError::Interrupted`] once `interrupt` is set.
    pub fn get_region_interruptible(
        &self,
        query: &RegionQuery,
        interrupt: &AtomicBool,
    ) -> Result<Option<RegionResponse>, TileError> {
        self.get_region_with(query, Some(interrupt))
    }

    fn get_region_with(
        &self,
        query: &RegionQuery,
        interrupt: Option<&AtomicBool>,
    ) -> Result<Option<RegionResponse>, TileError> {
        if !is_valid_quality(query.quality) {
            return Err(TileError::InvalidQuality {
                quality: query.quality,
            });
        }
        let request = query.to_request()?;

        let (out_width, out_height) = request.output_dimensions();
        let pixels = out_width as u64 * out_height as u64;
        if pixels > self.max_region_pixels {
            return Err(TileError::invalid(format!(
                "region output of {}x{} exceeds the limit of {} pixels",
                out_width, out_height, self.max_region_pixels
            )));
        }

        let region = match interrupt {
            Some(flag) => self.stitcher.read_region_interruptible(&request, flag)?,
            None => self.stitcher.read_region(&request)?,
        };
        let Some(region) = region else {
            debug!(region = %request, "No data for region");
            return Ok(None);
        };

        let data = self
            .encoder
            .encode(region.image(), query.format, query.quality)?;

        debug!(
            region = %request,
            format = %query.format,
            bytes = data.len(),
            "Encoded region"
        );

        Ok(Some(RegionResponse {
            data,
            width: region.width(),
            height: region.height(),
            format: query.format,
        }))
    }

    /// Metadata of the underlying source.
    pub fn metadata(&self) -> &ImageMetadata {
        self.stitcher.metadata()
    }

    pub fn stitcher(&self) -> &Stitcher<S> {
        &self.stitcher
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.stitcher.cache().stats()
    }

    /// Drop all cached tiles.
    pub fn clear_cache(&self) {
        self.stitcher.cache().clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
