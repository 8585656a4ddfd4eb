//! Tile grids and sample size selection.
//!
//! For every sample size the image is partitioned into a grid of tiles small
//! enough that each decoded tile stays close to the viewport size. A tile
//! decoded at sample size `n` is `1/n` of its logical size, so coarser sample
//! sizes need fewer, larger tiles.
//!
//! # Sample Size Selection
//!
//! A continuous zoom scale maps to the largest power of two strictly below
//! `1 / scale`, or 1 when no such power exists:
//!
//! | scale | 1/scale | sample size |
//! |-------|---------|-------------|
//! | 1.0   | 1.0     | 1           |
//! | 0.5   | 2.0     | 1           |
//! | 0.26  | 3.85    | 2           |
//! | 0.24  | 4.17    | 4           |
//! | 0.0   | -       | 32          |

use serde::Serialize;

use crate::source::PixelBuffer;

use super::rect::Rect;

/// Decoded tiles may exceed the viewport by this factor in each dimension.
pub const GRID_SLACK: f64 = 1.25;

/// Sample size used when the scale is exactly zero (not yet known).
pub const ZERO_SCALE_SAMPLE_SIZE: u32 = 32;

/// Upper bound for the doubling search in [`sample_size_for_scale`].
pub const MAX_SAMPLE_SIZE: u32 = 1 << 30;

/// Pick the subsampling level for a zoom scale.
pub fn sample_size_for_scale(scale: f32) -> u32 {
    if scale == 0.0 {
        return ZERO_SCALE_SAMPLE_SIZE;
    }

    let target = 1.0 / scale;
    let mut power: u32 = 1;
    while power < MAX_SAMPLE_SIZE && ((power * 2) as f32) < target {
        power *= 2;
    }
    power
}

// =============================================================================
// Tile
// =============================================================================

/// Identifies a tile by sample size and position in its grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileId {
    /// Sample size of the grid holding the tile
    pub level: u32,

    /// Position in the grid (column-major)
    pub index: usize,
}

impl TileId {
    pub const fn new(level: u32, index: usize) -> Self {
        Self { level, index }
    }
}

/// Decode state of a tile.
#[derive(Debug, Default)]
pub enum TileState {
    #[default]
    Empty,
    /// A decode is in flight. Only one may exist per tile.
    Loading,
    Available(PixelBuffer),
}

/// One rectangular region of the image at a specific sample size.
#[derive(Debug)]
pub struct Tile {
    rect: Rect,
    state: TileState,
}

impl Tile {
    pub(crate) fn new(rect: Rect) -> Self {
        Self {
            rect,
            state: TileState::Empty,
        }
    }

    /// Bounds in logical image coordinates.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn state(&self) -> &TileState {
        &self.state
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, TileState::Available(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, TileState::Loading)
    }

    pub fn pixels(&self) -> Option<&PixelBuffer> {
        match &self.state {
            TileState::Available(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Mark the tile as loading.
    ///
    /// Returns `false` if the tile is not `Empty`, in which case no decode
    /// should be dispatched for it.
    pub(crate) fn begin_loading(&mut self) -> bool {
        if matches!(self.state, TileState::Empty) {
            self.state = TileState::Loading;
            true
        } else {
            false
        }
    }

    /// Clear the loading flag without storing anything.
    pub(crate) fn cancel_loading(&mut self) {
        if self.is_loading() {
            self.state = TileState::Empty;
        }
    }

    /// Store a decoded buffer, ending the load.
    pub(crate) fn fill(&mut self, buffer: PixelBuffer) {
        self.state = TileState::Available(buffer);
    }

    /// Drop the decoded buffer, if any, and reset to `Empty`.
    ///
    /// Returns the number of bytes freed. Calling this on a tile that holds no
    /// buffer is a no-op; a `Loading` tile keeps its flag.
    pub(crate) fn release(&mut self) -> usize {
        if let TileState::Available(buffer) = &self.state {
            let freed = buffer.byte_len();
            self.state = TileState::Empty;
            freed
        } else {
            0
        }
    }
}

// =============================================================================
// Grid
// =============================================================================

/// The complete set of tiles covering the image at one sample size.
#[derive(Debug)]
pub struct Grid {
    level: u32,
    epoch: u64,
    columns: usize,
    rows: usize,
    tiles: Vec<Tile>,
}

impl Grid {
    /// Partition a `width` x `height` logical image for sample size `level`.
    ///
    /// Columns are added until a decoded tile is no wider than
    /// `GRID_SLACK * viewport_width`; rows likewise for height. The last
    /// column and row absorb the remainder of the integer division so the
    /// tiles cover the image exactly.
    pub fn generate(
        level: u32,
        epoch: u64,
        viewport_width: u32,
        viewport_height: u32,
        width: i32,
        height: i32,
    ) -> Self {
        let level = level.max(1) as i32;
        let columns = Self::divisions(width, level, viewport_width);
        let rows = Self::divisions(height, level, viewport_height);
        let tile_width = width / columns;
        let tile_height = height / rows;

        let mut tiles = Vec::with_capacity(columns as usize * rows as usize);
        for x in 0..columns {
            for y in 0..rows {
                let rect = Rect::new(
                    x * tile_width,
                    y * tile_height,
                    if x == columns - 1 {
                        width
                    } else {
                        (x + 1) * tile_width
                    },
                    if y == rows - 1 {
                        height
                    } else {
                        (y + 1) * tile_height
                    },
                );
                tiles.push(Tile::new(rect));
            }
        }

        Self {
            level: level as u32,
            epoch,
            columns: columns as usize,
            rows: rows as usize,
            tiles,
        }
    }

    /// Number of divisions of `extent` needed so that one division decoded at
    /// `level` fits within the slack bound of `viewport`.
    fn divisions(extent: i32, level: i32, viewport: u32) -> i32 {
        let bound = viewport as f64 * GRID_SLACK;
        let mut count = 1;
        let mut decoded = (extent / count) / level;
        // Never split below one pixel per division
        while decoded as f64 > bound && count < extent {
            count += 1;
            decoded = (extent / count) / level;
        }
        count
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Unique generation number of this grid instance.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// `(columns, rows)` of the partition.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    pub(crate) fn tile_mut(&mut self, index: usize) -> Option<&mut Tile> {
        self.tiles.get_mut(index)
    }

    pub(crate) fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.iter_mut()
    }

    /// Release every decoded buffer in the grid, returning bytes freed.
    pub(crate) fn release_all(&mut self) -> usize {
        self.tiles.iter_mut().map(Tile::release).sum()
    }
}
