//! Image source abstraction.
//!
//! The tile provider never parses image files itself. It talks to two
//! collaborators:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              TileProvider               │
//! └───────────┬─────────────────┬───────────┘
//!             │ open            │ decode_region (worker threads)
//!             ▼                 ▼
//! ┌──────────────────┐  ┌──────────────────┐
//! │   ImageSource    │─▶│  RegionDecoder   │
//! │ (orientation,    │  │ (rect, sample    │
//! │  opens decoder)  │  │  size → pixels)  │
//! └──────────────────┘  └──────────────────┘
//! ```
//!
//! [`ImageFileSource`] and [`DynamicImageDecoder`] implement both on top of
//! the `image` crate.

mod buffer;
mod memory;

pub use buffer::{PixelBuffer, PixelFormat};
pub use memory::{DynamicImageDecoder, ImageFileSource};

use async_trait::async_trait;

use crate::error::{DecodeError, TileError};
use crate::tile::{Orientation, Rect};

/// Decodes rectangular regions of a source image.
///
/// Implementations are called from decode worker threads, possibly for several
/// regions at once.
pub trait RegionDecoder: Send + Sync {
    /// Raw (stored) image size as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Decode `rect` (raw coordinates), subsampled by `sample_size`.
    ///
    /// A sample size of `n` returns a buffer `1/n` the width and height of the
    /// region. `format` is a preference; `None` lets the decoder pick the
    /// closest match for the source.
    fn decode_region(
        &self,
        rect: Rect,
        sample_size: u32,
        format: Option<PixelFormat>,
    ) -> Result<PixelBuffer, DecodeError>;
}

/// Provides the decoder and orientation metadata for one image.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// The decoder this source opens.
    type Decoder: RegionDecoder + 'static;

    /// Open the decode capability.
    ///
    /// Failure here is a construction error and is surfaced to the caller of
    /// [`TileProvider::open`](crate::tile::TileProvider::open).
    async fn open_decoder(&self) -> Result<Self::Decoder, TileError>;

    /// Stored rotation of the image.
    fn orientation(&self) -> Orientation;
}
