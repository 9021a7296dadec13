//! Tile decomposition.
//!
//! Maps an arbitrary region request onto the native tiles of the best pyramid
//! level. Tiles are expressed as [`RegionRequest`]s in full-resolution
//! coordinates carrying the level's downsample, so they double as cache keys.
//!
//! # Grid
//!
//! At a level with downsample `d`, tile column `i` spans full-resolution
//! columns `[trunc(i * tile_width * d), trunc((i + 1) * tile_width * d))`,
//! clipped to the image width (rows likewise). Neighbouring tiles share their
//! edge, so tiles never overlap and leave no gaps. Edge tiles are shrunk to the
//! image bounds, never padded.

use crate::error::TileError;
use crate::region::RegionRequest;
use crate::slide::ImageMetadata;

use super::pyramid::closest_level;

/// Decompose `request` into the native tiles covering it.
///
/// Tiles come back in row-major order (top to bottom, left to right). A
/// request lying entirely outside the image yields an empty list, which
/// callers treat as "no data".
///
/// # Errors
///
/// Returns [`TileError::InvalidArgument`] if the metadata holds no levels.
pub fn decompose_region(
    request: &RegionRequest,
    metadata: &ImageMetadata,
) -> Result<Vec<RegionRequest>, TileError> {
    let level = closest_level(&metadata.downsamples, request.downsample())?;
    let downsample = metadata.downsamples[level];

    let x_start = request.x().max(0);
    let y_start = request.y().max(0);
    let x_end = request.right().min(metadata.width as i64);
    let y_end = request.bottom().min(metadata.height as i64);
    if x_start >= x_end || y_start >= y_end {
        return Ok(Vec::new());
    }

    let columns = grid_spans(
        x_start,
        x_end,
        metadata.tile_width as f64 * downsample,
        metadata.width as i64,
    );
    let rows = grid_spans(
        y_start,
        y_end,
        metadata.tile_height as f64 * downsample,
        metadata.height as i64,
    );

    let mut tiles = Vec::with_capacity(columns.len() * rows.len());
    for &(y, height) in &rows {
        for &(x, width) in &columns {
            tiles.push(RegionRequest::new(
                x,
                y,
                width,
                height,
                downsample,
                request.z(),
                request.t(),
            )?);
        }
    }

    Ok(tiles)
}

/// Grid cells along one axis intersecting `[start, end)`, as `(offset, length)`.
///
/// `step` is the cell size in full-resolution pixels; cell edges are
/// truncated toward zero and clipped to `limit`.
fn grid_spans(start: i64, end: i64, step: f64, limit: i64) -> Vec<(i64, u32)> {
    let edge = |index: i64| -> i64 { ((index as f64 * step) as i64).min(limit) };

    let mut index = (start as f64 / step).floor() as i64;
    while index > 0 && edge(index) > start {
        index -= 1;
    }

    let mut spans = Vec::new();
    loop {
        let low = edge(index);
        if low >= end {
            break;
        }
        let high = edge(index + 1);
        if high > low && high > start {
            spans.push((low, (high - low) as u32));
        }
        index += 1;
    }
    spans
}

// =============================================================================
// Tests
// =============================================================================
