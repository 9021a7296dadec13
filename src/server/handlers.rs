//! HTTP request handlers for the region API.
//!
//! This module contains the Axum handlers for serving regions, image metadata,
//! cache statistics and health checks.
//!
//! # Endpoints
//!
//! - `GET /region?x=..&y=..&width=..&height=..` - Serve an encoded region
//! - `GET /metadata` - Pyramid description
//! - `GET /cache` - Tile cache statistics
//! - `GET /health` - Health check endpoint

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use crate::error::TileError;
use crate::slide::TileSource;
use crate::tile::{CacheStats, OutputFormat, RegionQuery, RegionService, DEFAULT_JPEG_QUALITY};

const REGION_WIDTH_HEADER: HeaderName = HeaderName::from_static("x-region-width");
const REGION_HEIGHT_HEADER: HeaderName = HeaderName::from_static("x-region-height");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the region service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: TileSource + ?Sized> {
    /// The region service for processing region requests
    pub region_service: Arc<RegionService<S>>,

    /// Cache-Control max-age in seconds (defaults to 1 hour)
    pub cache_max_age: u32,

    /// JPEG quality for requests that do not name one
    pub default_quality: u8,
}

impl<S: TileSource + ?Sized> AppState<S> {
    pub fn new(region_service: RegionService<S>) -> Self {
        Self::with_cache_max_age(region_service, 3600)
    }

    pub fn with_cache_max_age(region_service: RegionService<S>, cache_max_age: u32) -> Self {
        Self {
            region_service: Arc::new(region_service),
            cache_max_age,
            default_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_default_quality(mut self, quality: u8) -> Self {
        self.default_quality = quality;
        self
    }
}

impl<S: TileSource + ?Sized> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            region_service: Arc::clone(&self.region_service),
            cache_max_age: self.cache_max_age,
            default_quality: self.default_quality,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for region requests.
#[derive(Debug, Deserialize)]
pub struct RegionQueryParams {
    /// Left edge in full-resolution pixels
    pub x: i64,

    /// Top edge in full-resolution pixels
    pub y: i64,

    /// Width in full-resolution pixels
    pub width: u32,

    /// Height in full-resolution pixels
    pub height: u32,

    /// Downsample factor (default: 1)
    #[serde(default = "default_downsample")]
    pub downsample: f64,

    #[serde(default)]
    pub z: u32,

    #[serde(default)]
    pub t: u32,

    /// Output format, `jpeg` or `png` (default: jpeg)
    #[serde(default)]
    pub format: Option<String>,

    /// JPEG quality (1-100, defaults to the server setting)
    #[serde(default)]
    pub quality: Option<u8>,
}

impl RegionQueryParams {
    /// Convert into a service query, parsing the output format.
    pub fn into_query(self, default_quality: u8) -> Result<RegionQuery, TileError> {
        let format = match self.format.as_deref() {
            Some(format) => format.parse()?,
            None => OutputFormat::default(),
        };

        Ok(
            RegionQuery::new(self.x, self.y, self.width, self.height, self.downsample)
                .with_plane(self.z, self.t)
                .with_format(format)
                .with_quality(self.quality.unwrap_or(default_quality)),
        )
    }
}

fn default_downsample() -> f64 {
    1.0
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_argument")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Metadata for a single pyramid level.
#[derive(Debug, Serialize)]
pub struct LevelMetadataResponse {
    /// Pyramid level index (0 = full resolution)
    pub level: usize,

    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Number of tiles in X direction
    pub tiles_x: u32,

    /// Number of tiles in Y direction
    pub tiles_y: u32,

    /// Downsample factor relative to level 0
    pub downsample: f64,
}

/// Response from the metadata endpoint.
#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    /// Width of the full-resolution image in pixels
    pub width: u32,

    /// Height of the full-resolution image in pixels
    pub height: u32,

    /// Native tile width in level pixels
    pub tile_width: u32,

    /// Native tile height in level pixels
    pub tile_height: u32,

    /// Pixel layout of the tiles (e.g., "Rgb8")
    pub color_type: String,

    /// Number of pyramid levels
    pub level_count: usize,

    /// Metadata for each pyramid level
    pub levels: Vec<LevelMetadataResponse>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// 4xx errors are logged at WARN level, 5xx errors at ERROR level.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::InvalidArgument { .. } => (StatusCode::BAD_REQUEST, "invalid_argument"),
            TileError::InvalidQuality { .. } => (StatusCode::BAD_REQUEST, "invalid_quality"),
            TileError::UnsupportedPixelLayout { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_pixel_layout")
            }
            TileError::Interrupted => (StatusCode::SERVICE_UNAVAILABLE, "interrupted"),
            TileError::SourceRead { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "source_error"),
            TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

/// Errors a handler can end with.
#[derive(Debug)]
pub enum HandlerError {
    Tile(TileError),

    /// The blocking region task panicked or was cancelled
    Task(JoinError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Tile(err) => err.into_response(),
            HandlerError::Task(err) => {
                error!(error = %err, "Region task failed");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let error_response =
                    ErrorResponse::with_status("internal_error", "Region task failed", status);
                (status, Json(error_response)).into_response()
            }
        }
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError::Tile(err)
    }
}

impl From<JoinError> for HandlerError {
    fn from(err: JoinError) -> Self {
        HandlerError::Task(err)
    }
}

/// Raises the interrupt flag when dropped.
///
/// Held by the handler future: if the client goes away and axum drops the
/// future, the blocking read stops before its next tile fetch.
struct InterruptOnDrop(Arc<AtomicBool>);

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle region requests.
///
/// # Endpoint
///
/// `GET /region`
///
/// # Query Parameters
///
/// - `x`, `y`: Top-left corner in full-resolution pixels (may be negative)
/// - `width`, `height`: Size in full-resolution pixels
/// - `downsample`: Full-resolution pixels per output pixel (default: 1)
/// - `z`, `t`: Focal plane and timepoint (default: 0)
/// - `format`: `jpeg` or `png` (default: jpeg)
/// - `quality`: JPEG quality 1-100 (default: server setting, 80 unless configured)
///
/// # Response
///
/// - `200 OK`: Encoded region
/// - `204 No Content`: The region has no data (outside the image)
/// - `400 Bad Request`: Invalid parameters
/// - `422 Unprocessable Entity`: Compositing needed for non-RGB data
/// - `500 Internal Server Error`: Processing error
///
/// # Headers
///
/// - `Content-Type: image/jpeg` or `image/png`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Region-Width`, `X-Region-Height`: Output dimensions
pub async fn region_handler<S: TileSource + ?Sized + 'static>(
    State(state): State<AppState<S>>,
    Query(params): Query<RegionQueryParams>,
) -> Result<Response, HandlerError> {
    let query = params.into_query(state.default_quality)?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let _guard = InterruptOnDrop(Arc::clone(&interrupt));

    let service = Arc::clone(&state.region_service);
    let region = tokio::task::spawn_blocking(move || {
        service.get_region_interruptible(&query, &interrupt)
    })
    .await??;

    let Some(region) = region else {
        debug!("Region has no data");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let headers = [
        (header::CONTENT_TYPE, region.format.content_type().to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (REGION_WIDTH_HEADER, region.width.to_string()),
        (REGION_HEIGHT_HEADER, region.height.to_string()),
    ];

    Ok((StatusCode::OK, headers, region.data).into_response())
}

/// Handle metadata requests.
///
/// # Endpoint
///
/// `GET /metadata`
pub async fn metadata_handler<S: TileSource + ?Sized + 'static>(
    State(state): State<AppState<S>>,
) -> Json<MetadataResponse> {
    let metadata = state.region_service.metadata();

    let levels = (0..metadata.level_count())
        .filter_map(|level| {
            let downsample = metadata.level_downsample(level)?;
            let (width, height) = metadata.level_dimensions(level)?;
            Some(LevelMetadataResponse {
                level,
                width,
                height,
                tiles_x: width.div_ceil(metadata.tile_width),
                tiles_y: height.div_ceil(metadata.tile_height),
                downsample,
            })
        })
        .collect();

    Json(MetadataResponse {
        width: metadata.width,
        height: metadata.height,
        tile_width: metadata.tile_width,
        tile_height: metadata.tile_height,
        color_type: format!("{:?}", metadata.color_type),
        level_count: metadata.level_count(),
        levels,
    })
}

/// Handle cache statistics requests.
///
/// # Endpoint
///
/// `GET /cache`
pub async fn cache_stats_handler<S: TileSource + ?Sized + 'static>(
    State(state): State<AppState<S>>,
) -> Json<CacheStats> {
    Json(state.region_service.cache_stats())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
