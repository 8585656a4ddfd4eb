//! Incremental tile loading.
//!
//! This module splits a very large image into tiles, decodes the tiles a
//! viewport needs in the background, and keeps only what the current view
//! can use.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Viewer                  │
//! └────────────────────┬────────────────────┘
//!                      │ request_tiles / poll_completions
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileProvider               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  Orientation    │  │
//! │  │  (one Grid   │  │  Corrector      │  │
//! │  │   per level) │  │  (logical→raw)  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ spawn_blocking
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        Decode workers (RegionDecoder)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileProvider`]: Coordinator; answers viewport requests and applies decodes
//! - [`TileCache`]: Grids keyed by sample size, with hit/miss partitioning and eviction
//! - [`Grid`]: Exact partition of the logical image for one sample size
//! - [`OrientationCorrector`]: Maps logical tile rectangles to stored pixel coordinates
//! - [`sample_size_for_scale`]: Quantizes a zoom scale to a power-of-two sample size
//!
//! # Example
//!
//! ```no_run
//! use region_tiles::source::ImageFileSource;
//! use region_tiles::tile::{Rect, TileProvider};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), region_tiles::TileError> {
//!     let source = ImageFileSource::new("scan.png");
//!     let mut provider = TileProvider::open(source, |tiles| {
//!         println!("{} tiles ready", tiles.len());
//!     })
//!     .await?;
//!
//!     let viewport = Rect::from_size(provider.width(), provider.height());
//!     provider.request_tiles(0.25, 1280, 720, viewport)?;
//!     provider.settle().await?;
//!     Ok(())
//! }
//! ```

mod cache;
mod grid;
mod orientation;
mod provider;
mod rect;
mod worker;

pub use cache::{CacheStats, Partition, TileCache};
pub use grid::{
    sample_size_for_scale, Grid, Tile, TileId, TileState, GRID_SLACK, MAX_SAMPLE_SIZE,
    ZERO_SCALE_SAMPLE_SIZE,
};
pub use orientation::{Orientation, OrientationCorrector};
pub use provider::{LoadEvent, TileProvider, TileRef, TilesChanged};
pub use rect::Rect;
pub use worker::LastRequest;
