//! # Pyramid Region
//!
//! Arbitrary rectangular regions, at arbitrary resolution, from
//! multi-resolution (pyramidal) images.
//!
//! Large images are stored as pyramids: the full-resolution level plus
//! progressively downsampled copies, each cut into fixed-size tiles. This crate
//! answers "give me this rectangle at this downsample" by picking the closest
//! pyramid level, decomposing the rectangle into that level's tiles, fetching
//! the tiles through a bounded LRU cache, and stitching them into one buffer of
//! exactly the requested size.
//!
//! ## Features
//!
//! - **Level selection**: the level whose downsample is closest in ratio to the request
//! - **Tile decomposition**: non-overlapping tiles clipped to the image bounds
//! - **Tile caching**: shared LRU cache of decoded tiles, optionally single-flight
//! - **Stitching**: zero-copy for tile-aligned requests, nearest-neighbour compositing otherwise
//! - **HTTP API**: axum server exposing regions as JPEG or PNG
//!
//! ## Architecture
//!
//! - [`region`] - The region request value type
//! - [`slide`] - Tile source abstraction, image metadata and an in-memory image pyramid
//! - [`tile`] - Level selection, decomposition, cache, stitcher and encoding
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use image::{DynamicImage, Rgb, RgbImage};
//! use pyramid_region::{ImagePyramidSource, PyramidOptions, RegionRequest, Stitcher, TileCache};
//!
//! let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1000, 1000, Rgb([200, 180, 160])));
//! let source = ImagePyramidSource::from_image("memory", image, PyramidOptions::default()).unwrap();
//!
//! let stitcher = Stitcher::with_cache(Arc::new(source), Arc::new(TileCache::with_capacity(256)));
//!
//! // The whole image at a quarter of its resolution
//! let request = RegionRequest::on_default_plane(0, 0, 1000, 1000, 4.0).unwrap();
//! let region = stitcher.read_region(&request).unwrap().unwrap();
//! assert_eq!((region.width(), region.height()), (250, 250));
//! ```

pub mod config;
pub mod error;
pub mod region;
pub mod server;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, PyramidArgs, RenderConfig, ServeConfig};
pub use error::{SourceError, TileError};
pub use region::RegionRequest;
pub use server::{
    create_router, health_handler, metadata_handler, region_handler, AppState, ErrorResponse,
    HealthResponse, MetadataResponse, RouterConfig,
};
pub use slide::{ImageMetadata, ImagePyramidSource, PyramidOptions, TileBuffer, TileSource};
pub use tile::{
    clamp_quality, closest_level, decompose_region, is_valid_quality, CacheStats, CachedTile,
    FetchMode, OutputFormat, RegionEncoder, RegionQuery, RegionResponse, RegionService, Stitcher,
    TileCache, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_REGION_PIXELS, DEFAULT_TILE_CACHE_CAPACITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
