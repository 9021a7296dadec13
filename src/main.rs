//! Pyramid Region - arbitrary regions from multi-resolution images.
//!
//! This binary starts the HTTP server or renders a single region to a file.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyramid_region::{
    config::{Cli, Command, PyramidArgs, RenderConfig, ServeConfig},
    server::{create_router, RouterConfig},
    slide::ImagePyramidSource,
    tile::{RegionQuery, RegionService, TileCache},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    info!("  Image: {}", config.image.display());
    info!(
        "  Pyramid: {}x{} tiles, downsamples {:?}",
        config.pyramid.tile_width, config.pyramid.tile_height, config.pyramid.downsamples
    );
    info!(
        "  Cache: {} tiles, {:?} fetch mode",
        config.cache_tiles,
        config.fetch_mode()
    );
    info!("  Region limit: {} pixels", config.max_region_pixels);

    let source = match open_source(&config.image, &config.pyramid).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open {}: {}", config.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    // One cache for the whole server, sized for the workload
    let cache = Arc::new(TileCache::with_mode(config.cache_tiles, config.fetch_mode()));
    let service = RegionService::with_cache(Arc::new(source), Arc::clone(&cache))
        .with_max_region_pixels(config.max_region_pixels);

    let router = create_router(service, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/metadata", addr);
    info!(
        "    curl -o region.jpg 'http://{}/region?x=0&y=0&width=1024&height=1024&downsample=4'",
        addr
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let stats = cache.stats();
    info!(
        entries = stats.entries,
        hits = stats.hits,
        misses = stats.misses,
        loads = stats.loads,
        evictions = stats.evictions,
        "Tile cache at shutdown"
    );
    cache.clear();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pyramid_region=debug,tower_http=debug"
    } else {
        "pyramid_region=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_default_quality(config.jpeg_quality);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

/// Decode the image and build its pyramid off the async runtime.
async fn open_source(path: &Path, pyramid: &PyramidArgs) -> Result<ImagePyramidSource, String> {
    let path = path.to_path_buf();
    let options = pyramid.to_options();

    tokio::task::spawn_blocking(move || ImagePyramidSource::open(path, options))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let format = match config.output_format() {
        Ok(format) => format,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = match open_source(&config.image, &config.pyramid).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open {}: {}", config.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let query = RegionQuery::new(
        config.x,
        config.y,
        config.width,
        config.height,
        config.downsample,
    )
    .with_plane(config.z, config.t)
    .with_format(format)
    .with_quality(config.quality);

    let service =
        RegionService::new(Arc::new(source)).with_max_region_pixels(config.max_region_pixels);
    let region = match tokio::task::spawn_blocking(move || service.get_region(&query)).await {
        Ok(Ok(Some(region))) => region,
        Ok(Ok(None)) => {
            error!("Region lies outside the image, nothing to write");
            return ExitCode::FAILURE;
        }
        Ok(Err(e)) => {
            error!("Failed to read region: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Region task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &region.data).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {}x{} {} region to {}",
        region.width,
        region.height,
        region.format,
        config.output.display()
    );

    ExitCode::SUCCESS
}
