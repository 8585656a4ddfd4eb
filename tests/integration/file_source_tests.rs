//! End-to-end tests against real image files.

use image::{DynamicImage, Rgb, RgbImage};
use std::path::PathBuf;

use region_tiles::{ImageFileSource, Orientation, PixelFormat, Rect, TileId, TileProvider};

/// Write a gradient PNG where red = x and green = y (mod 256).
fn write_gradient(name: &str, width: u32, height: u32) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("region-tiles-it-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("gradient.png");
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 0])
    }))
    .save(&path)
    .unwrap();
    path
}

#[tokio::test]
async fn test_png_tiles_hold_source_pixels() {
    let path = write_gradient("plain", 256, 128);
    let mut provider = TileProvider::open(ImageFileSource::new(&path), |_| {})
        .await
        .unwrap();

    provider.request_tiles(1.0, 64, 64, Rect::from_size(256, 128)).unwrap();
    provider.settle().await.unwrap();

    let visible = provider.request_tiles(1.0, 64, 64, Rect::from_size(256, 128)).unwrap();
    assert_eq!(visible.len(), 8);

    // Column-major: index 2 is the first tile of the second column
    let tile = visible.iter().find(|t| t.id() == TileId::new(1, 2)).unwrap();
    assert_eq!(tile.rect(), Rect::new(64, 0, 128, 64));
    let pixels = tile.pixels();
    assert_eq!(pixels.format(), PixelFormat::Rgba8);
    assert_eq!((pixels.width(), pixels.height()), (64, 64));
    assert_eq!(&pixels.data()[..4], &[64, 0, 0, 255]);

    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[tokio::test]
async fn test_rotated_png_decodes_raw_region() {
    let path = write_gradient("rotated", 256, 128);
    let source = ImageFileSource::new(&path).with_orientation(Orientation::Rotate180);
    let mut provider = TileProvider::open(source, |_| {}).await.unwrap();
    provider.set_preferred_pixel_format(None).unwrap();

    provider.request_tiles(1.0, 64, 64, Rect::new(0, 0, 64, 64)).unwrap();
    provider.settle().await.unwrap();

    let visible = provider.visible_tiles();
    assert_eq!(visible.len(), 1);
    let pixels = visible[0].pixels();
    // Logical (0, 0, 64, 64) is raw (192, 64, 256, 128)
    assert_eq!(pixels.format(), PixelFormat::Rgb8);
    assert_eq!(&pixels.data()[..3], &[192, 64, 0]);

    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[tokio::test]
async fn test_subsampled_png_tiles_shrink() {
    let path = write_gradient("subsampled", 256, 128);
    let mut provider = TileProvider::open(ImageFileSource::new(&path), |_| {})
        .await
        .unwrap();

    provider.request_tiles(0.2, 64, 64, Rect::from_size(256, 128)).unwrap();
    provider.settle().await.unwrap();

    let visible = provider.visible_tiles();
    assert!(!visible.is_empty());
    for tile in &visible {
        assert_eq!(tile.level(), 4);
        assert_eq!(tile.pixels().width(), tile.rect().width() as u32 / 4);
        assert_eq!(tile.pixels().height(), tile.rect().height() as u32 / 4);
    }

    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}
