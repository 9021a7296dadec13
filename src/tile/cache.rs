//! Tile cache for decoded tiles.
//!
//! This module provides a bounded LRU cache mapping tile regions to decoded
//! pixel buffers, so that overlapping and repeated region requests do not
//! decode the same tile twice.
//!
//! # Cache Key
//!
//! Tiles are cached by their [`RegionRequest`]: position, size, downsample,
//! z-plane and timepoint. A cache instance therefore belongs to one image
//! source; give each source its own instance (or one shared default instance
//! per process when there is a single source).
//!
//! # Failed Reads
//!
//! A tile whose read fails, or which the source reports as empty, is cached
//! as [`CachedTile::Unavailable`]. Later requests get the sentinel back
//! without calling the source again.
//!
//! # Concurrent Misses
//!
//! In [`FetchMode::Relaxed`] two threads missing the same key may both call
//! the source; both results are inserted and the later one wins. In
//! [`FetchMode::SingleFlight`] the first thread registers an in-flight marker
//! and the others wait for its result.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::region::RegionRequest;
use crate::slide::{TileBuffer, TileSource};

/// Default cache capacity in tiles, used by the default instance.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100;

// =============================================================================
// Cache Entries
// =============================================================================

/// A cache entry: decoded pixels, or a marker that the tile could not be read.
#[derive(Debug, Clone)]
pub enum CachedTile {
    /// Decoded tile, shared with every caller that fetched it
    Ready(Arc<TileBuffer>),

    /// The source failed or returned no data for this tile
    Unavailable,
}

impl CachedTile {
    /// The pixel buffer, if the tile was readable.
    pub fn buffer(&self) -> Option<&Arc<TileBuffer>> {
        match self {
            CachedTile::Ready(buffer) => Some(buffer),
            CachedTile::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CachedTile::Unavailable)
    }
}

/// How concurrent misses on the same key are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Every missing caller reads the tile itself; last insert wins
    #[default]
    Relaxed,

    /// One caller reads the tile, concurrent callers wait for its result
    SingleFlight,
}

/// Snapshot of cache state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cached tiles (including unavailable markers)
    pub entries: usize,

    /// Maximum number of cached tiles
    pub capacity: usize,

    /// `get_or_load` calls answered from the cache
    pub hits: u64,

    /// `get_or_load` calls that had to read from the source
    pub misses: u64,

    /// Source reads performed
    pub loads: u64,

    /// Entries dropped to stay within capacity
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
}

/// Marker for a tile currently being read in single-flight mode.
struct InFlight {
    done: Mutex<bool>,
    ready: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.ready.wait(&mut done);
        }
    }

    fn finish(&self) {
        *self.done.lock() = true;
        self.ready.notify_all();
    }
}

/// Releases an in-flight marker when the leading fetch ends, even by panic.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<RegionRequest, Arc<InFlight>>>,
    key: RegionRequest,
    flight: Arc<InFlight>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
        self.flight.finish();
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Bounded LRU cache of decoded tiles.
///
/// When an insert takes the cache past its capacity, the least-recently
/// accessed entry is evicted. Recency bookkeeping happens under the same lock
/// as inserts and evictions.
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared across threads via `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use image::{DynamicImage, RgbImage};
/// use pyramid_region::{CachedTile, RegionRequest, TileBuffer, TileCache};
///
/// let cache = TileCache::with_capacity(2);
///
/// let key = RegionRequest::on_default_plane(0, 0, 256, 256, 1.0).unwrap();
/// let image = DynamicImage::ImageRgb8(RgbImage::new(256, 256));
/// cache.put(key, CachedTile::Ready(Arc::new(TileBuffer::new(key, image))));
///
/// assert!(cache.contains(&key));
/// assert_eq!(cache.len(), 1);
/// ```
pub struct TileCache {
    /// The underlying LRU cache
    entries: Mutex<LruCache<RegionRequest, CachedTile>>,

    /// Maximum number of entries
    capacity: usize,

    mode: FetchMode,

    /// In-flight reads for single-flight mode
    in_flight: Mutex<HashMap<RegionRequest, Arc<InFlight>>>,

    counters: Counters,
}

impl TileCache {
    /// Create a cache with the default capacity (100 tiles) in relaxed mode.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a relaxed-mode cache holding at most `capacity` tiles.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_mode(capacity, FetchMode::Relaxed)
    }

    /// Create a cache with the given capacity and concurrent-miss policy.
    pub fn with_mode(capacity: usize, mode: FetchMode) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            mode,
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Get a tile, marking it as recently used.
    pub fn get(&self, key: &RegionRequest) -> Option<CachedTile> {
        self.entries.lock().get(key).cloned()
    }

    /// Get a tile without updating LRU order.
    pub fn peek(&self, key: &RegionRequest) -> Option<CachedTile> {
        self.entries.lock().peek(key).cloned()
    }

    /// Check if a tile is cached without updating LRU order.
    pub fn contains(&self, key: &RegionRequest) -> bool {
        self.entries.lock().contains(key)
    }

    /// Store a tile, evicting the least-recently-used entry if over capacity.
    ///
    /// If the key already exists, its value is replaced and marked as
    /// recently used.
    pub fn put(&self, key: RegionRequest, tile: CachedTile) {
        let evicted = self.entries.lock().push(key, tile);

        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(tile = %evicted_key, "Evicted tile");
            }
        }
    }

    /// Remove a tile, returning it if it was cached.
    pub fn remove(&self, key: &RegionRequest) -> Option<CachedTile> {
        self.entries.lock().pop(key)
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Get the current number of cached tiles.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Get the maximum number of cached tiles.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Snapshot of size and counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Return the cached tile for `key`, reading it from `source` on a miss.
    ///
    /// The result is inserted even when the read fails, as
    /// [`CachedTile::Unavailable`], so a broken tile is not re-read on every
    /// request.
    pub fn get_or_load<S: TileSource + ?Sized>(
        &self,
        key: &RegionRequest,
        source: &S,
    ) -> CachedTile {
        if let Some(tile) = self.get(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            trace!(tile = %key, "Tile cache hit");
            return tile;
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        match self.mode {
            FetchMode::Relaxed => {
                let tile = self.load(key, source);
                self.put(*key, tile.clone());
                tile
            }
            FetchMode::SingleFlight => self.load_single_flight(key, source),
        }
    }

    fn load_single_flight<S: TileSource + ?Sized>(
        &self,
        key: &RegionRequest,
        source: &S,
    ) -> CachedTile {
        loop {
            let flight = {
                let mut in_flight = self.in_flight.lock();

                if let Some(flight) = in_flight.get(key) {
                    // Another thread is reading this tile, wait for it
                    let flight = Arc::clone(flight);
                    drop(in_flight);
                    flight.wait();

                    if let Some(tile) = self.get(key) {
                        return tile;
                    }
                    // Evicted before we looked, try again
                    continue;
                }

                // Re-check under the in-flight lock: the previous leader may
                // have finished between our miss and taking the lock
                if let Some(tile) = self.get(key) {
                    return tile;
                }

                let flight = Arc::new(InFlight::new());
                in_flight.insert(*key, Arc::clone(&flight));
                flight
            };

            let guard = FlightGuard {
                in_flight: &self.in_flight,
                key: *key,
                flight,
            };
            let tile = self.load(key, source);
            self.put(*key, tile.clone());
            drop(guard);

            return tile;
        }
    }

    /// Read a tile from the source, converting failures to the sentinel.
    fn load<S: TileSource + ?Sized>(&self, key: &RegionRequest, source: &S) -> CachedTile {
        self.counters.loads.fetch_add(1, Ordering::Relaxed);

        match source.read_tile(key) {
            Ok(Some(image)) => {
                debug!(
                    tile = %key,
                    width = image.width(),
                    height = image.height(),
                    "Loaded tile"
                );
                CachedTile::Ready(Arc::new(TileBuffer::new(*key, image)))
            }
            Ok(None) => {
                debug!(tile = %key, "Tile source returned no data");
                CachedTile::Unavailable
            }
            Err(e) => {
                warn!(tile = %key, error = %e, "Tile read failed, marking unavailable");
                CachedTile::Unavailable
            }
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
