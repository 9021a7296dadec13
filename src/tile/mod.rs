//! Region engine.
//!
//! This module turns arbitrary region requests into pixels assembled from the
//! native tiles of a pyramid, and encodes them for delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       HTTP Handlers / render command    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             RegionService               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │   Stitcher   │  │  RegionEncoder  │  │
//! │  │  (compose    │  │  (JPEG / PNG)   │  │
//! │  │   tiles)     │  │                 │  │
//! │  └──────┬───────┘  └─────────────────┘  │
//! └─────────┼───────────────────────────────┘
//!           │ decompose_region + closest_level
//!           ▼
//! ┌─────────────────────────────────────────┐
//! │     TileCache (decoded tiles, LRU)      │
//! └────────────────────┬────────────────────┘
//!                      │ miss
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileSource                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`closest_level`]: picks the pyramid level nearest a requested downsample
//! - [`decompose_region`]: splits a request into native tiles of that level
//! - [`TileCache`]: bounded LRU of decoded tiles keyed by [`RegionRequest`](crate::RegionRequest)
//! - [`Stitcher`]: composes cached tiles into the requested region
//! - [`RegionService`]: validation, stitching and encoding for callers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use image::{DynamicImage, RgbImage};
//! use pyramid_region::{ImagePyramidSource, PyramidOptions, RegionRequest, Stitcher, TileCache};
//!
//! let image = DynamicImage::ImageRgb8(RgbImage::new(1000, 1000));
//! let source = Arc::new(ImagePyramidSource::from_image("memory", image, PyramidOptions::default()).unwrap());
//!
//! // One cache shared by every stitcher over this source
//! let cache = Arc::new(TileCache::with_capacity(512));
//! let stitcher = Stitcher::with_cache(source, Arc::clone(&cache));
//!
//! let request = RegionRequest::on_default_plane(900, 900, 200, 200, 1.0).unwrap();
//! let region = stitcher.read_region(&request).unwrap().unwrap();
//! assert_eq!((region.width(), region.height()), (200, 200));
//! assert_eq!(cache.len(), 1);
//! ```

mod cache;
mod decompose;
mod encoder;
mod pyramid;
mod service;
mod stitch;

pub use cache::{CacheStats, CachedTile, FetchMode, TileCache, DEFAULT_TILE_CACHE_CAPACITY};
pub use decompose::decompose_region;
pub use encoder::{
    clamp_quality, is_valid_quality, OutputFormat, RegionEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use pyramid::closest_level;
pub use service::{RegionQuery, RegionResponse, RegionService, DEFAULT_MAX_REGION_PIXELS};
pub use stitch::{same_downsample, Stitcher, DOWNSAMPLE_TOLERANCE};
