use thiserror::Error;

use crate::tile::Rect;

/// Error reported by a [`RegionDecoder`](crate::source::RegionDecoder) when a
/// region produced no pixel data.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An API was used in a way its contract forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MisuseError {
    /// Called from a thread other than the one that opened the provider
    #[error("must be called on the coordination thread that opened the provider")]
    WrongContext,

    /// Called after `dispose()`
    #[error("tile provider has been disposed")]
    Disposed,
}

/// Errors that can occur while opening a tile provider or loading tiles
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The image source could not produce a usable decoder
    #[error("Cannot open image source: {reason}")]
    Construction { reason: String },

    /// The decode primitive returned no data for a region.
    ///
    /// The source is either unsupported or corrupt; the region is not retried.
    /// `rect` is the region in raw (stored) image coordinates.
    #[error("Decoder returned no data for {rect} at sample size {level}: {message}")]
    DecodeFailure {
        level: u32,
        rect: Rect,
        message: String,
    },

    /// Viewport dimensions must be at least 1x1
    #[error("Invalid viewport size {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    #[error(transparent)]
    Misuse(#[from] MisuseError),
}

impl TileError {
    pub(crate) fn construction(reason: impl Into<String>) -> Self {
        TileError::Construction {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by the caller rather than the image.
    pub fn is_misuse(&self) -> bool {
        matches!(self, TileError::Misuse(_))
    }
}
