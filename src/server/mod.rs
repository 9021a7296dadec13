//! HTTP server layer.
//!
//! This module exposes region reads of a single image pyramid over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              GET /region?x=&y=&width=&height=                   │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (blocking region reads)  │  │  (router config, CORS)      │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    cache_stats_handler, health_handler, metadata_handler, region_handler, AppState,
    ErrorResponse, HandlerError, HealthResponse, LevelMetadataResponse, MetadataResponse,
    RegionQueryParams,
};
pub use routes::{create_router, RouterConfig};
