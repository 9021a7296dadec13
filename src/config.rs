//! Configuration management for the region server.
//!
//! This module provides the command-line interface:
//! - Command-line arguments via clap
//! - Environment variables with `PYRAMID_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `serve` - Serve regions of one image over HTTP
//! - `render` - Write one region to a file
//!
//! # Environment Variables
//!
//! - `PYRAMID_HOST` - Server bind address (default: 0.0.0.0)
//! - `PYRAMID_PORT` - Server port (default: 3000)
//! - `PYRAMID_IMAGE` - Image file to serve (required)
//! - `PYRAMID_TILE_WIDTH` / `PYRAMID_TILE_HEIGHT` - Native tile size (default: 256)
//! - `PYRAMID_DOWNSAMPLES` - Pyramid levels, comma-separated (default: 1,4,16)
//! - `PYRAMID_CACHE_TILES` - Max decoded tiles to cache (default: 10000)
//! - `PYRAMID_SINGLE_FLIGHT` - Coalesce concurrent reads of one tile (default: false)
//! - `PYRAMID_JPEG_QUALITY` - Default JPEG quality (default: 80)
//! - `PYRAMID_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `PYRAMID_MAX_REGION_PIXELS` - Largest region output, in pixels (default: 67108864)
//! - `PYRAMID_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::slide::{validate_downsamples, PyramidOptions, DEFAULT_TILE_SIZE};
use crate::tile::{
    is_valid_quality, FetchMode, OutputFormat, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_REGION_PIXELS,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default number of decoded tiles the server keeps.
pub const DEFAULT_SERVER_CACHE_TILES: usize = 10_000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pyramid Region - arbitrary regions from multi-resolution images.
#[derive(Parser, Debug, Clone)]
#[command(name = "pyramid-region")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve regions of an image over HTTP
    Serve(ServeConfig),

    /// Render one region of an image to a file
    Render(RenderConfig),
}

/// How the image is cut into a pyramid.
#[derive(Args, Debug, Clone)]
pub struct PyramidArgs {
    /// Native tile width in level pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "PYRAMID_TILE_WIDTH")]
    pub tile_width: u32,

    /// Native tile height in level pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "PYRAMID_TILE_HEIGHT")]
    pub tile_height: u32,

    /// Downsample factor of each pyramid level (comma-separated, finest first).
    #[arg(
        long,
        env = "PYRAMID_DOWNSAMPLES",
        value_delimiter = ',',
        default_value = "1,4,16"
    )]
    pub downsamples: Vec<f64>,
}

impl PyramidArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err("tile_width and tile_height must be greater than 0".to_string());
        }
        validate_downsamples(&self.downsamples).map_err(|e| e.to_string())
    }

    pub fn to_options(&self) -> PyramidOptions {
        PyramidOptions {
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            downsamples: self.downsamples.clone(),
        }
    }
}

/// Options of the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PYRAMID_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PYRAMID_PORT")]
    pub port: u16,

    // =========================================================================
    // Image Configuration
    // =========================================================================
    /// Image file (JPEG or PNG) to serve.
    #[arg(long, env = "PYRAMID_IMAGE")]
    pub image: PathBuf,

    #[command(flatten)]
    pub pyramid: PyramidArgs,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of decoded tiles to cache.
    #[arg(long, default_value_t = DEFAULT_SERVER_CACHE_TILES, env = "PYRAMID_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Let concurrent requests for one uncached tile share a single read.
    #[arg(long, default_value_t = false, env = "PYRAMID_SINGLE_FLIGHT")]
    pub single_flight: bool,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Default JPEG quality for regions (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PYRAMID_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "PYRAMID_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Largest region a request may produce, in output pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_REGION_PIXELS, env = "PYRAMID_MAX_REGION_PIXELS")]
    pub max_region_pixels: u64,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PYRAMID_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.pyramid.validate()?;

        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.max_region_pixels == 0 {
            return Err("max_region_pixels must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fetch_mode(&self) -> FetchMode {
        if self.single_flight {
            FetchMode::SingleFlight
        } else {
            FetchMode::Relaxed
        }
    }
}

/// Options of the `render` command.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Image file (JPEG or PNG) to read from.
    #[arg(long, env = "PYRAMID_IMAGE")]
    pub image: PathBuf,

    #[command(flatten)]
    pub pyramid: PyramidArgs,

    /// Left edge in full-resolution pixels.
    #[arg(long, allow_negative_numbers = true)]
    pub x: i64,

    /// Top edge in full-resolution pixels.
    #[arg(long, allow_negative_numbers = true)]
    pub y: i64,

    /// Region width in full-resolution pixels.
    #[arg(long)]
    pub width: u32,

    /// Region height in full-resolution pixels.
    #[arg(long)]
    pub height: u32,

    /// Full-resolution pixels per output pixel.
    #[arg(long, default_value_t = 1.0)]
    pub downsample: f64,

    /// Focal plane.
    #[arg(long, default_value_t = 0)]
    pub z: u32,

    /// Timepoint.
    #[arg(long, default_value_t = 0)]
    pub t: u32,

    /// Output file; the format follows the extension (.jpg, .jpeg or .png).
    #[arg(short, long)]
    pub output: PathBuf,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub quality: u8,

    /// Largest region to render, in output pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_REGION_PIXELS)]
    pub max_region_pixels: u64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.pyramid.validate()?;

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }

        if !self.downsample.is_finite() || self.downsample <= 0.0 {
            return Err("downsample must be a positive number".to_string());
        }

        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }

        if self.max_region_pixels == 0 {
            return Err("max_region_pixels must be greater than 0".to_string());
        }

        self.output_format().map(|_| ())
    }

    /// Output format derived from the output file extension.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        OutputFormat::from_path(&self.output).ok_or_else(|| {
            format!(
                "cannot infer output format from '{}' (use .jpg, .jpeg or .png)",
                self.output.display()
            )
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
