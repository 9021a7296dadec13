//! Router configuration for the region server.
//!
//! This module defines the HTTP routes and applies CORS and tracing middleware.
//!
//! # Route Structure
//!
//! ```text
//! /health      - Health check
//! /metadata    - Pyramid description
//! /region      - Encoded region (query parameters)
//! /cache       - Tile cache statistics
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pyramid_region::server::{create_router, RouterConfig};
//! use pyramid_region::tile::RegionService;
//!
//! let service = RegionService::new(Arc::new(source));
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://viewer.local".to_string()])
//!     .with_default_quality(90);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, create_router(service, config)).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    cache_stats_handler, health_handler, metadata_handler, region_handler, AppState,
};
use crate::slide::TileSource;
use crate::tile::{RegionService, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// JPEG quality used when a request does not name one
    pub default_quality: u8,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a router configuration with defaults.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - JPEG quality is 80
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            default_quality: DEFAULT_JPEG_QUALITY,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Set the JPEG quality for requests without a `quality` parameter.
    pub fn with_default_quality(mut self, quality: u8) -> Self {
        self.default_quality = quality;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// All routes share one [`RegionService`], and therefore one tile cache.
pub fn create_router<S>(region_service: RegionService<S>, config: RouterConfig) -> Router
where
    S: TileSource + ?Sized + 'static,
{
    let app_state = AppState::with_cache_max_age(region_service, config.cache_max_age)
        .with_default_quality(config.default_quality);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/metadata", get(metadata_handler::<S>))
        .route("/region", get(region_handler::<S>))
        .route("/cache", get(cache_stats_handler::<S>))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// CORS for the read-only API. Unparseable origins are skipped.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let allowed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(allowed)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
