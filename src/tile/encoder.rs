//! Region encoder.
//!
//! Turns stitched region pixels into bytes for the HTTP layer and the render
//! command.
//!
//! # Design Decisions
//!
//! - **JPEG or PNG**: JPEG for viewing at a configurable quality, PNG when the
//!   exact pixels matter.
//! - **No resizing**: Regions are already at their requested resolution.
//! - **Layout conversion**: JPEG output accepts only 8-bit gray or RGB, so other
//!   layouts are converted to 8-bit RGB before encoding.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::error::TileError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Output Format
// =============================================================================

/// Encoded output format of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// MIME type for the `Content-Type` header.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    /// Guess the format from a file extension (`.jpg`, `.jpeg`, `.png`).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for OutputFormat {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(TileError::invalid(format!(
                "unsupported output format '{}' (expected jpeg or png)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => write!(f, "jpeg"),
            OutputFormat::Png => write!(f, "png"),
        }
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Encoder for stitched regions.
///
/// # Example
///
/// ```
/// use image::{DynamicImage, RgbImage};
/// use pyramid_region::{OutputFormat, RegionEncoder};
///
/// let encoder = RegionEncoder::new();
/// let image = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
///
/// let jpeg = encoder.encode(&image, OutputFormat::Jpeg, 85).unwrap();
/// assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegionEncoder {}

impl RegionEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode `image` in `format`.
    ///
    /// `quality` only affects JPEG output and is clamped to 1-100.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::EncodeError`] if the codec fails.
    pub fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Bytes, TileError> {
        match format {
            OutputFormat::Jpeg => self.encode_jpeg(image, clamp_quality(quality)),
            OutputFormat::Png => self.encode_png(image),
        }
    }

    /// Encode as JPEG at [`DEFAULT_JPEG_QUALITY`].
    pub fn encode_default(&self, image: &DynamicImage) -> Result<Bytes, TileError> {
        self.encode(image, OutputFormat::Jpeg, DEFAULT_JPEG_QUALITY)
    }

    fn encode_jpeg(&self, image: &DynamicImage, quality: u8) -> Result<Bytes, TileError> {
        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);

        let result = match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => {
                encoder.encode_image(image)
            }
            other => encoder.encode_image(&DynamicImage::ImageRgb8(other.to_rgb8())),
        };
        result.map_err(|e| TileError::EncodeError {
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output))
    }

    fn encode_png(&self, image: &DynamicImage) -> Result<Bytes, TileError> {
        let mut output = Cursor::new(Vec::new());
        image
            .write_to(&mut output, ImageFormat::Png)
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;
        Ok(Bytes::from(output.into_inner()))
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
