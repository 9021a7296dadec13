use image::ColorType;
use thiserror::Error;

/// Errors raised by region decomposition, caching and stitching.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// A caller-supplied value violates a precondition (empty pyramid,
    /// non-positive dimensions or downsample)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The compositing path only handles 8-bit RGB data
    #[error("Unsupported pixel layout: {color_type:?} (compositing requires 8-bit RGB)")]
    UnsupportedPixelLayout { color_type: ColorType },

    /// A tile source failed to produce pixels for a tile
    #[error("Tile source read failed: {message}")]
    SourceRead { message: String },

    /// The caller raised its interruption flag between tile fetches
    #[error("Region read interrupted")]
    Interrupted,

    /// Requested output quality is out of range
    #[error("Invalid quality: {quality} (must be 1-100)")]
    InvalidQuality { quality: u8 },

    /// Output encoding failed
    #[error("Failed to encode region: {message}")]
    EncodeError { message: String },
}

impl TileError {
    /// Shorthand for [`TileError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        TileError::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Errors that can occur when opening an image as a tile source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Image file does not exist
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Other filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// The file could not be decoded as an image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Pyramid parameters are not usable for this image
    #[error("Invalid pyramid metadata: {0}")]
    InvalidMetadata(#[from] TileError),
}
