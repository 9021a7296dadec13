//! Slide abstraction layer.
//!
//! This module provides the interface between pixel decoding and the region
//! engine: the [`TileSource`] capability, the static [`ImageMetadata`] of a
//! pyramid, and the shared [`TileBuffer`] pixel container.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Stitcher / TileCache             │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           TileSource Trait              │
//! │  (metadata + blocking read_tile)        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        ImagePyramidSource               │
//! │  (decoded image, in-memory levels)      │
//! └─────────────────────────────────────────┘
//! ```

mod image_source;
mod source;

pub use image_source::{ImagePyramidSource, PyramidOptions, DEFAULT_DOWNSAMPLES, DEFAULT_TILE_SIZE};
pub use source::{validate_downsamples, ImageMetadata, TileBuffer, TileSource};
