//! # Region Tiles
//!
//! Incremental, viewport-driven tile loading for images too large to decode
//! at once.
//!
//! A viewer asks for the tiles covering its current viewport at its current
//! zoom scale. The provider returns whatever is already decoded, decodes the
//! rest in the background at a power-of-two subsampling suited to the zoom,
//! and releases pixels the view no longer needs.
//!
//! ## Features
//!
//! - **Level quantization**: Zoom scales map to power-of-two sample sizes
//! - **Viewport-sized tiles**: Grids are sized so decoded tiles stay close to the screen
//! - **Progressive display**: Tiles from other sample sizes stand in while decoding
//! - **Orientation correction**: 90/180/270 degree stored rotations are handled transparently
//! - **Bounded memory**: Off-screen tiles and inactive levels are released eagerly
//!
//! ## Architecture
//!
//! - [`source`] - Image source and region decoder traits, `image`-backed implementation
//! - [`tile`] - Grids, cache, decode workers and the [`TileProvider`]
//! - [`config`] - CLI configuration types
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use region_tiles::{ImageFileSource, Orientation, Rect, TileProvider};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), region_tiles::TileError> {
//!     let source = ImageFileSource::new("panorama.jpg").with_orientation(Orientation::Rotate90);
//!     let mut provider = TileProvider::open(source, |_| {}).await?;
//!
//!     let viewport = Rect::new(0, 0, 2000, 1500);
//!     provider.request_tiles(0.5, 1000, 750, viewport)?;
//!     provider.settle().await?;
//!
//!     for tile in provider.visible_tiles() {
//!         println!("{} at sample size {}", tile.rect(), tile.level());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, OutputFormat, ViewOptions};
pub use error::{DecodeError, MisuseError, TileError};
pub use source::{
    DynamicImageDecoder, ImageFileSource, ImageSource, PixelBuffer, PixelFormat, RegionDecoder,
};
pub use tile::{
    sample_size_for_scale, CacheStats, Grid, LastRequest, LoadEvent, Orientation,
    OrientationCorrector, Partition, Rect, Tile, TileCache, TileId, TileProvider, TileRef,
    TileState, GRID_SLACK, MAX_SAMPLE_SIZE, ZERO_SCALE_SAMPLE_SIZE,
};
