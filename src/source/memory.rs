//! Image sources backed by the `image` crate.
//!
//! The whole raw image is held decoded in memory and regions are cropped and
//! downscaled from it. This does not save memory the way a true region
//! decoder would, but it satisfies the [`RegionDecoder`] contract for every
//! format the `image` crate reads.

use std::path::PathBuf;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;

use super::buffer::{PixelBuffer, PixelFormat};
use super::{ImageSource, RegionDecoder};
use crate::error::{DecodeError, TileError};
use crate::tile::{Orientation, Rect};

// =============================================================================
// DynamicImageDecoder
// =============================================================================

/// Region decoder over an in-memory [`DynamicImage`].
pub struct DynamicImageDecoder {
    image: DynamicImage,
}

impl DynamicImageDecoder {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }
}

impl RegionDecoder for DynamicImageDecoder {
    fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    fn decode_region(
        &self,
        rect: Rect,
        sample_size: u32,
        format: Option<PixelFormat>,
    ) -> Result<PixelBuffer, DecodeError> {
        let (width, height) = self.dimensions();
        if rect.is_empty()
            || rect.left < 0
            || rect.top < 0
            || rect.right as i64 > width as i64
            || rect.bottom as i64 > height as i64
        {
            return Err(DecodeError::new(format!(
                "region {} outside image bounds {}x{}",
                rect, width, height
            )));
        }

        let region = self.image.crop_imm(
            rect.left as u32,
            rect.top as u32,
            rect.width() as u32,
            rect.height() as u32,
        );

        // Sample sizes below 1 behave like 1
        let sample_size = sample_size.max(1);
        let region = if sample_size > 1 {
            let target_w = (region.width() / sample_size).max(1);
            let target_h = (region.height() / sample_size).max(1);
            region.resize_exact(target_w, target_h, FilterType::Triangle)
        } else {
            region
        };

        let format = format.unwrap_or_else(|| PixelFormat::closest_to(&self.image));
        Ok(PixelBuffer::from_image(region, format))
    }
}

// =============================================================================
// ImageFileSource
// =============================================================================

/// Image source reading a file from the local filesystem.
///
/// Orientation metadata is not read from the file; callers pass the stored
/// rotation explicitly.
#[derive(Debug, Clone)]
pub struct ImageFileSource {
    path: PathBuf,
    orientation: Orientation,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            orientation: Orientation::Rotate0,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ImageSource for ImageFileSource {
    type Decoder = DynamicImageDecoder;

    async fn open_decoder(&self) -> Result<Self::Decoder, TileError> {
        let path = self.path.clone();
        // Full decode is blocking and CPU bound
        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| TileError::construction(format!("decoder task failed: {}", e)))?
            .map_err(|e| {
                TileError::construction(format!("{}: {}", self.path.display(), e))
            })?;

        Ok(DynamicImageDecoder::new(image))
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }
}
