//! Region requests.
//!
//! A [`RegionRequest`] describes a rectangle of a pyramidal image in
//! full-resolution pixel coordinates, together with the resolution the caller
//! wants it rendered at and the focal plane / timepoint it belongs to.
//!
//! The same type is used for caller requests and for the native tiles they
//! decompose into, which makes it the tile cache key as well.
//!
//! # Equality
//!
//! Two requests are equal only if all seven fields are equal. The downsample
//! is compared by its exact bit pattern, never with a tolerance, so that
//! `Eq` and `Hash` agree for cache lookups.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::TileError;

/// An axis-aligned region of an image at a given resolution and plane.
#[derive(Debug, Clone, Copy)]
pub struct RegionRequest {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    downsample: f64,
    z: u32,
    t: u32,
}

impl RegionRequest {
    /// Create a validated region request.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidArgument`] if `width` or `height` is zero,
    /// if `downsample` is not a finite positive number, or if the right or
    /// bottom edge does not fit in an `i64`.
    pub fn new(
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        downsample: f64,
        z: u32,
        t: u32,
    ) -> Result<Self, TileError> {
        if width == 0 || height == 0 {
            return Err(TileError::invalid(format!(
                "region dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if !downsample.is_finite() || downsample <= 0.0 {
            return Err(TileError::invalid(format!(
                "downsample must be a finite positive number, got {}",
                downsample
            )));
        }
        if x.checked_add(width as i64).is_none() || y.checked_add(height as i64).is_none() {
            return Err(TileError::invalid(format!(
                "region at ({}, {}) of size {}x{} overflows the coordinate range",
                x, y, width, height
            )));
        }

        Ok(Self {
            x,
            y,
            width,
            height,
            downsample,
            z,
            t,
        })
    }

    /// Create a request on the default plane (z = 0, t = 0).
    pub fn on_default_plane(
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        downsample: f64,
    ) -> Result<Self, TileError> {
        Self::new(x, y, width, height, downsample, 0, 0)
    }

    pub fn x(&self) -> i64 {
        self.x
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn downsample(&self) -> f64 {
        self.downsample
    }

    pub fn z(&self) -> u32 {
        self.z
    }

    pub fn t(&self) -> u32 {
        self.t
    }

    /// Exclusive right edge in full-resolution pixels.
    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    /// Exclusive bottom edge in full-resolution pixels.
    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    /// Size of the pixel buffer this region maps to at its downsample.
    ///
    /// Rounded to the nearest integer, never less than one pixel.
    pub fn output_dimensions(&self) -> (u32, u32) {
        (
            scaled_length(self.width, self.downsample),
            scaled_length(self.height, self.downsample),
        )
    }

    /// Whether `other` lies entirely inside this region on the same plane.
    ///
    /// Downsamples are not compared.
    pub fn contains(&self, other: &RegionRequest) -> bool {
        self.z == other.z
            && self.t == other.t
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Whether both regions cover the same rectangle on the same plane.
    ///
    /// Downsamples are not compared.
    pub fn same_bounds(&self, other: &RegionRequest) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.z == other.z
            && self.t == other.t
    }
}

fn scaled_length(length: u32, downsample: f64) -> u32 {
    let scaled = (length as f64 / downsample).round();
    if scaled < 1.0 {
        1
    } else if scaled > u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

impl PartialEq for RegionRequest {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.downsample.to_bits() == other.downsample.to_bits()
            && self.z == other.z
            && self.t == other.t
    }
}

impl Eq for RegionRequest {}

impl Hash for RegionRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
        self.width.hash(state);
        self.height.hash(state);
        self.downsample.to_bits().hash(state);
        self.z.hash(state);
        self.t.hash(state);
    }
}

impl fmt::Display for RegionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[x={}, y={}, w={}, h={}, downsample={}, z={}, t={}]",
            self.x, self.y, self.width, self.height, self.downsample, self.z, self.t
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
