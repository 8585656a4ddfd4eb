//! Decoded pixel buffers.

use bytes::Bytes;
use image::DynamicImage;
use serde::Serialize;

/// Pixel layouts a decoder can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit RGBA, four bytes per pixel
    #[default]
    Rgba8,
    /// 8-bit RGB, three bytes per pixel
    Rgb8,
    /// 8-bit grayscale, one byte per pixel
    Luma8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 => 1,
        }
    }

    /// Closest format able to hold `image` without losing channels.
    pub fn closest_to(image: &DynamicImage) -> Self {
        let color = image.color();
        if color.has_alpha() {
            PixelFormat::Rgba8
        } else if color.has_color() {
            PixelFormat::Rgb8
        } else {
            PixelFormat::Luma8
        }
    }
}

/// A decoded region.
///
/// Owned exclusively by the tile holding it; dropping the buffer frees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Bytes,
}

impl PixelBuffer {
    /// Wrap raw pixel data.
    ///
    /// Returns `None` if `data` does not hold exactly `width * height` pixels
    /// of `format`.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Option<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Convert a decoded image into the requested layout.
    pub fn from_image(image: DynamicImage, format: PixelFormat) -> Self {
        let (width, height) = (image.width(), image.height());
        let data = match format {
            PixelFormat::Rgba8 => image.into_rgba8().into_raw(),
            PixelFormat::Rgb8 => image.into_rgb8().into_raw(),
            PixelFormat::Luma8 => image.into_luma8().into_raw(),
        };
        Self {
            width,
            height,
            format,
            data: Bytes::from(data),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Memory held by the pixel data in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}
