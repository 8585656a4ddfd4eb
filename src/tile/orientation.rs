//! Orientation correction.
//!
//! Images may be stored rotated, with the rotation recorded in metadata.
//! Tiles are laid out in *logical* coordinates (the image as it should be
//! displayed), but the decoder only understands *raw* coordinates (the pixels
//! as stored). [`OrientationCorrector`] converts between the two.
//!
//! ```text
//!   raw 2000x1000, stored rotated 90°      logical 1000x2000
//!   ┌───────────────────┐                  ┌─────────┐
//!   │                   │                  │         │
//!   │                   │        ──▶       │         │
//!   └───────────────────┘                  │         │
//!                                          └─────────┘
//! ```

use serde::Serialize;

use super::rect::Rect;

/// Stored rotation of the source image, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Orientation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Parse a rotation in degrees. Only multiples of 90 in `0..360` are valid.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Orientation::Rotate0),
            90 => Some(Orientation::Rotate90),
            180 => Some(Orientation::Rotate180),
            270 => Some(Orientation::Rotate270),
            _ => None,
        }
    }

    /// Map an EXIF `Orientation` tag value to a rotation.
    ///
    /// Mirrored orientations and undefined values are treated as upright.
    pub fn from_exif(value: u16) -> Self {
        match value {
            3 => Orientation::Rotate180,
            6 => Orientation::Rotate90,
            8 => Orientation::Rotate270,
            _ => Orientation::Rotate0,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Orientation::Rotate0 => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }

    /// Whether logical width and height are swapped relative to raw.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Orientation::Rotate90 | Orientation::Rotate270)
    }
}

/// Maps logical rectangles to raw decoder coordinates for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationCorrector {
    orientation: Orientation,
    raw_width: i32,
    raw_height: i32,
}

impl OrientationCorrector {
    pub fn new(orientation: Orientation, raw_width: i32, raw_height: i32) -> Self {
        Self {
            orientation,
            raw_width,
            raw_height,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn raw_size(&self) -> (i32, i32) {
        (self.raw_width, self.raw_height)
    }

    /// Size of the image as displayed.
    pub fn logical_size(&self) -> (i32, i32) {
        if self.orientation.swaps_axes() {
            (self.raw_height, self.raw_width)
        } else {
            (self.raw_width, self.raw_height)
        }
    }

    /// Convert a rectangle in logical coordinates to the raw rectangle that
    /// holds the same pixels.
    pub fn to_raw_rect(&self, rect: &Rect) -> Rect {
        let (w, h) = (self.raw_width, self.raw_height);
        match self.orientation {
            Orientation::Rotate0 => *rect,
            Orientation::Rotate90 => Rect::new(rect.top, h - rect.right, rect.bottom, h - rect.left),
            Orientation::Rotate180 => Rect::new(
                w - rect.right,
                h - rect.bottom,
                w - rect.left,
                h - rect.top,
            ),
            Orientation::Rotate270 => Rect::new(w - rect.bottom, rect.left, w - rect.top, rect.right),
        }
    }
}
