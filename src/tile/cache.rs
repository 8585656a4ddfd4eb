//! Level table of decoded tile grids.
//!
//! This module holds one [`Grid`] per sample size and answers visibility
//! queries against them. It is the sole owner of every decoded pixel buffer.
//!
//! # Release Points
//!
//! Buffers are released only at these transitions:
//! - a tile of the active level falls outside the viewport ([`TileCache::partition`])
//! - a request fully hits its level, evicting all other levels
//!   ([`TileCache::evict_other_levels`])
//! - the cache is torn down ([`TileCache::clear`])
//!
//! # Thread Safety
//!
//! The cache is not shared. It lives inside the tile provider and is mutated
//! only from the coordination thread.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use super::grid::{Grid, Tile, TileId};
use super::rect::Rect;

// =============================================================================
// Partition
// =============================================================================

/// Tiles of one level that intersect a viewport, split by availability.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Intersecting tiles that hold decoded pixels, in grid order
    pub hits: Vec<TileId>,

    /// Intersecting tiles that are `Empty` or `Loading`, in grid order
    pub misses: Vec<TileId>,
}

impl Partition {
    /// Every intersecting tile is already decoded.
    pub fn is_full_hit(&self) -> bool {
        self.misses.is_empty()
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of retained grids
    pub levels: usize,

    /// Total tiles across all retained grids
    pub tiles: usize,

    /// Tiles holding decoded pixels
    pub available: usize,

    /// Tiles with a decode in flight
    pub loading: usize,

    /// Bytes held by decoded pixels
    pub resident_bytes: usize,

    /// Decodes dispatched whose completion has not been handled yet
    pub in_flight: usize,
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Per-level tile grids for one image.
#[derive(Debug)]
pub struct TileCache {
    /// Logical image width
    width: i32,

    /// Logical image height
    height: i32,

    /// Grids keyed by sample size
    grids: HashMap<u32, Grid>,

    /// Epoch handed to the next grid created
    next_epoch: u64,
}

impl TileCache {
    /// Create an empty cache for a logical image of the given size.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            grids: HashMap::new(),
            next_epoch: 0,
        }
    }

    /// Get the grid for `level`, generating it on first use.
    ///
    /// The viewport size only matters when the grid is created; an existing
    /// grid is returned unchanged.
    pub fn grid_for(&mut self, level: u32, viewport_width: u32, viewport_height: u32) -> &Grid {
        let (width, height) = (self.width, self.height);
        let next_epoch = &mut self.next_epoch;
        self.grids.entry(level).or_insert_with(|| {
            let epoch = *next_epoch;
            *next_epoch += 1;
            let grid = Grid::generate(level, epoch, viewport_width, viewport_height, width, height);
            let (columns, rows) = grid.dimensions();
            debug!(level, epoch, columns, rows, "Created tile grid");
            grid
        })
    }

    pub fn grid(&self, level: u32) -> Option<&Grid> {
        self.grids.get(&level)
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.grids.get(&id.level)?.tile(id.index)
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.grids.get_mut(&id.level)?.tile_mut(id.index)
    }

    /// Look up a tile only if it still belongs to the grid instance `epoch`.
    pub(crate) fn tile_in_epoch_mut(&mut self, id: TileId, epoch: u64) -> Option<&mut Tile> {
        let grid = self.grids.get_mut(&id.level)?;
        if grid.epoch() != epoch {
            return None;
        }
        grid.tile_mut(id.index)
    }

    /// Split the tiles of `level` that intersect `viewport` into hits and
    /// misses.
    ///
    /// Decoded tiles of this level that do not intersect the viewport are
    /// released. Returns an empty partition if the level has no grid.
    pub fn partition(&mut self, level: u32, viewport: &Rect) -> Partition {
        let mut partition = Partition::default();
        let Some(grid) = self.grids.get_mut(&level) else {
            return partition;
        };

        let mut released = 0;
        for (index, tile) in grid.tiles_mut().enumerate() {
            let id = TileId::new(level, index);
            if tile.rect().intersects(viewport) {
                if tile.is_available() {
                    partition.hits.push(id);
                } else {
                    partition.misses.push(id);
                }
            } else {
                released += tile.release();
            }
        }

        if released > 0 {
            debug!(level, released_bytes = released, "Released tiles outside viewport");
        }
        partition
    }

    /// Drop every grid except `keep_level`, releasing their buffers.
    ///
    /// Returns the number of grids evicted.
    pub fn evict_other_levels(&mut self, keep_level: u32) -> usize {
        let before = self.grids.len();
        self.grids.retain(|&level, grid| {
            if level == keep_level {
                return true;
            }
            let released = grid.release_all();
            debug!(level, released_bytes = released, "Evicted tile grid");
            false
        });
        before - self.grids.len()
    }

    /// Decoded tiles from levels other than `exclude_level` that intersect
    /// `viewport`.
    ///
    /// These stand in for the active level while it loads. Levels are visited
    /// coarsest first so finer fallback content is painted on top.
    pub fn cross_level_hits(&self, exclude_level: u32, viewport: &Rect) -> Vec<TileId> {
        let mut levels: Vec<u32> = self
            .grids
            .keys()
            .copied()
            .filter(|&level| level != exclude_level)
            .collect();
        levels.sort_unstable_by(|a, b| b.cmp(a));

        let mut hits = Vec::new();
        for level in levels {
            let grid = &self.grids[&level];
            for (index, tile) in grid.tiles().iter().enumerate() {
                if tile.is_available() && tile.rect().intersects(viewport) {
                    hits.push(TileId::new(level, index));
                }
            }
        }
        hits
    }

    /// Release every buffer and drop all grids.
    ///
    /// Returns the number of bytes freed.
    pub fn clear(&mut self) -> usize {
        let freed = self.grids.values_mut().map(Grid::release_all).sum();
        self.grids.clear();
        freed
    }

    /// Sample sizes with a retained grid, finest first.
    pub fn levels(&self) -> Vec<u32> {
        let mut levels: Vec<u32> = self.grids.keys().copied().collect();
        levels.sort_unstable();
        levels
    }

    /// Occupancy counters. `in_flight` is left at zero; the provider fills it.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            levels: self.grids.len(),
            ..CacheStats::default()
        };
        for grid in self.grids.values() {
            stats.tiles += grid.len();
            for tile in grid.tiles() {
                if let Some(pixels) = tile.pixels() {
                    stats.available += 1;
                    stats.resident_bytes += pixels.byte_len();
                } else if tile.is_loading() {
                    stats.loading += 1;
                }
            }
        }
        stats
    }
}

// =============================================================================
// Tests
// =============================================================================
