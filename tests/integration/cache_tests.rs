//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - Tiles are read once and reused across overlapping regions
//! - A cache shared by several stitchers serves all of them
//! - The cache stays within capacity under load
//! - Single-flight mode coalesces concurrent reads of one tile

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pyramid_region::{
    CachedTile, FetchMode, RegionQuery, RegionService, Stitcher, TileCache, TileSource,
};

use super::test_utils::{region, standard_source, SyntheticSource};

// =============================================================================
// Reuse
// =============================================================================

#[test]
fn test_overlapping_regions_reuse_tiles() {
    let source = standard_source();
    let stitcher = Stitcher::new(Arc::clone(&source));

    // Four tiles
    stitcher.read_region(&region(200, 200, 100, 100, 1.0)).unwrap();
    assert_eq!(source.read_count(), 4);

    // Same four tiles, different region
    stitcher.read_region(&region(250, 230, 50, 60, 1.0)).unwrap();
    assert_eq!(source.read_count(), 4);

    // Two new tiles to the right
    stitcher.read_region(&region(200, 200, 400, 100, 1.0)).unwrap();
    assert_eq!(source.read_count(), 6);

    let stats = stitcher.cache().stats();
    assert_eq!(stats.loads, 6);
    assert_eq!(stats.misses, 6);
    assert_eq!(stats.hits, 4 + 4);
}

#[test]
fn test_shared_cache_across_stitchers() {
    let source = standard_source();
    let cache = Arc::new(TileCache::with_capacity(128));

    let first = Stitcher::with_cache(Arc::clone(&source), Arc::clone(&cache));
    let second = Stitcher::with_cache(Arc::clone(&source), Arc::clone(&cache));

    first.read_region(&region(0, 0, 1000, 1000, 1.0)).unwrap();
    assert_eq!(source.read_count(), 16);

    second.read_region(&region(0, 0, 1000, 1000, 1.0)).unwrap();
    assert_eq!(source.read_count(), 16);
    assert_eq!(cache.len(), 16);
}

#[test]
fn test_levels_cached_independently() {
    let source = standard_source();
    let stitcher = Stitcher::new(Arc::clone(&source));

    stitcher.read_region(&region(0, 0, 256, 256, 1.0)).unwrap();
    stitcher.read_region(&region(0, 0, 1000, 1000, 4.0)).unwrap();
    stitcher.read_region(&region(0, 0, 1000, 1000, 16.0)).unwrap();

    let cache = stitcher.cache();
    assert!(cache.contains(&region(0, 0, 256, 256, 1.0)));
    assert!(cache.contains(&region(0, 0, 1000, 1000, 4.0)));
    assert!(cache.contains(&region(0, 0, 1000, 1000, 16.0)));
    assert_eq!(source.read_count(), 3);
}

#[test]
fn test_unavailable_tiles_cached() {
    let source = Arc::new(
        SyntheticSource::new(1000, 1000, 256, vec![1.0]).with_failing_tile(0, 0),
    );
    let stitcher = Stitcher::new(Arc::clone(&source));

    for _ in 0..5 {
        stitcher.read_region(&region(0, 0, 512, 512, 1.0)).unwrap();
    }
    assert_eq!(source.read_count(), 4);
    assert!(matches!(
        stitcher.cache().peek(&region(0, 0, 256, 256, 1.0)),
        Some(CachedTile::Unavailable)
    ));
}

// =============================================================================
// Capacity
// =============================================================================

#[test]
fn test_small_cache_stays_bounded() {
    let source = standard_source();
    let cache = Arc::new(TileCache::with_capacity(4));
    let stitcher = Stitcher::with_cache(Arc::clone(&source), Arc::clone(&cache));

    // 16 tiles through a 4-entry cache
    let out = stitcher
        .read_region(&region(0, 0, 1000, 1000, 1.0))
        .unwrap()
        .unwrap();
    assert_eq!(out.width(), 1000);
    assert_eq!(cache.len(), 4);
    assert_eq!(cache.stats().evictions, 12);

    // The last tiles of the row-major walk survive
    assert!(cache.contains(&region(768, 768, 232, 232, 1.0)));
    assert!(!cache.contains(&region(0, 0, 256, 256, 1.0)));
}

#[test]
fn test_concurrent_readers_respect_capacity() {
    let source = standard_source();
    let cache = Arc::new(TileCache::with_capacity(10));
    let stitcher = Arc::new(Stitcher::with_cache(Arc::clone(&source), Arc::clone(&cache)));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let stitcher = Arc::clone(&stitcher);
            thread::spawn(move || {
                for step in 0..10 {
                    let offset = ((worker * 97 + step * 131) % 900) as i64;
                    let request = region(offset, 900 - offset, 300, 200, 1.0);
                    let out = stitcher.read_region(&request).unwrap().unwrap();
                    assert_eq!((out.width(), out.height()), (300, 200));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(cache.len() <= 10);
    // Relaxed mode: every miss is exactly one source read
    let stats = cache.stats();
    assert_eq!(stats.misses, stats.loads);
    assert_eq!(stats.loads as usize, source.read_count());
}

// =============================================================================
// Fetch Modes
// =============================================================================

fn hammer_one_tile(mode: FetchMode) -> usize {
    let source = Arc::new(
        SyntheticSource::new(1000, 1000, 256, vec![1.0]).with_delay(Duration::from_millis(100)),
    );
    let cache = Arc::new(TileCache::with_mode(16, mode));
    let barrier = Arc::new(std::sync::Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let source = Arc::clone(&source);
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let tile = region(0, 0, 256, 256, 1.0);
                cache.get_or_load(&tile, source.as_ref())
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().buffer().is_some());
    }
    assert_eq!(cache.len(), 1);
    source.read_count()
}

#[test]
fn test_single_flight_reads_once() {
    assert_eq!(hammer_one_tile(FetchMode::SingleFlight), 1);
}

#[test]
fn test_relaxed_mode_may_read_more_than_once() {
    let reads = hammer_one_tile(FetchMode::Relaxed);
    assert!((1..=4).contains(&reads));
}

// =============================================================================
// Service Level
// =============================================================================

#[test]
fn test_service_cache_stats_and_clear() {
    let source = standard_source();
    let cache = Arc::new(TileCache::with_capacity(64));
    let service = RegionService::with_cache(Arc::clone(&source), Arc::clone(&cache));

    let query = RegionQuery::new(0, 0, 512, 512, 1.0);
    service.get_region(&query).unwrap().unwrap();
    service.get_region(&query).unwrap().unwrap();

    let stats = service.cache_stats();
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.loads, 4);
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.capacity, 64);

    service.clear_cache();
    assert!(cache.is_empty());

    service.get_region(&query).unwrap().unwrap();
    assert_eq!(source.read_count(), 8);
    assert_eq!(service.metadata().width, source.metadata().width);
}
