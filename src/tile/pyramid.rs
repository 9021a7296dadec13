//! Pyramid level selection.
//!
//! Levels are compared to a requested downsample by ratio distance:
//! `max(level / requested, requested / level)`. This is symmetric in log
//! space, so a level twice as coarse and a level twice as fine are equally
//! far from the request. Ties resolve to the lower index, i.e. the finer
//! level.

use crate::error::TileError;

/// Index of the pyramid level closest to `requested`.
///
/// # Errors
///
/// Returns [`TileError::InvalidArgument`] if `downsamples` is empty or
/// `requested` is not a finite positive number.
///
/// # Example
///
/// ```
/// use pyramid_region::tile::closest_level;
///
/// assert_eq!(closest_level(&[1.0, 2.0, 4.0], 1.5).unwrap(), 1);
/// assert_eq!(closest_level(&[1.0, 4.0], 2.0).unwrap(), 0);
/// ```
pub fn closest_level(downsamples: &[f64], requested: f64) -> Result<usize, TileError> {
    if downsamples.is_empty() {
        return Err(TileError::invalid("downsample list is empty"));
    }
    if !requested.is_finite() || requested <= 0.0 {
        return Err(TileError::invalid(format!(
            "requested downsample must be a finite positive number, got {}",
            requested
        )));
    }

    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (level, &downsample) in downsamples.iter().enumerate() {
        let distance = ratio_distance(downsample, requested);
        // Strict comparison keeps the finer level on ties
        if distance < best_distance {
            best = level;
            best_distance = distance;
        }
    }

    Ok(best)
}

fn ratio_distance(level: f64, requested: f64) -> f64 {
    (level / requested).max(requested / level)
}

// =============================================================================
// Tests
// =============================================================================
