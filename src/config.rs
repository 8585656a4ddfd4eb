//! Configuration for the `region-tiles` command line tool.
//!
//! This module provides the CLI definition, which supports:
//! - Subcommands for grid inspection and decoding
//! - Environment variables with `REGION_TILES_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use region_tiles::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Grid(config) => println!("{}x{}", config.width, config.height),
//!     Command::Render(config) => println!("{}", config.path.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `REGION_TILES_VIEWPORT_WIDTH` - Viewport width in pixels (default: 1280)
//! - `REGION_TILES_VIEWPORT_HEIGHT` - Viewport height in pixels (default: 720)
//! - `REGION_TILES_VIEWPORT` - Visible region as `left,top,right,bottom`
//! - `REGION_TILES_ORIENTATION` - Stored rotation in degrees (default: 0)
//! - `REGION_TILES_PIXEL_FORMAT` - Decode format (default: rgba8)
//! - `REGION_TILES_OUTPUT` - Report format, `text` or `json` (default: text)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::source::PixelFormat;
use crate::tile::{Orientation, Rect};

// =============================================================================
// Default Values
// =============================================================================

/// Default viewport width.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Region Tiles - incremental tile loading for very large images.
#[derive(Parser, Debug, Clone)]
#[command(name = "region-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the tile grid chosen for an image size and zoom, without decoding.
    Grid(GridConfig),

    /// Decode the tiles visible in a viewport and report them.
    Render(RenderConfig),
}

impl Command {
    pub fn view(&self) -> &ViewOptions {
        match self {
            Command::Grid(config) => &config.view,
            Command::Render(config) => &config.view,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Command::Grid(config) => config.validate(),
            Command::Render(config) => config.validate(),
        }
    }
}

/// Report format.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Text,
    /// JSON document
    Json,
}

/// Decode format requested from the decoder.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PixelFormatArg {
    /// Let the decoder pick the closest match for the image
    Auto,
    #[default]
    Rgba8,
    Rgb8,
    Luma8,
}

impl PixelFormatArg {
    pub fn preferred(self) -> Option<PixelFormat> {
        match self {
            PixelFormatArg::Auto => None,
            PixelFormatArg::Rgba8 => Some(PixelFormat::Rgba8),
            PixelFormatArg::Rgb8 => Some(PixelFormat::Rgb8),
            PixelFormatArg::Luma8 => Some(PixelFormat::Luma8),
        }
    }
}

/// Viewport and output options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ViewOptions {
    /// On-screen viewport width in pixels.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_WIDTH, env = "REGION_TILES_VIEWPORT_WIDTH")]
    pub viewport_width: u32,

    /// On-screen viewport height in pixels.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_HEIGHT, env = "REGION_TILES_VIEWPORT_HEIGHT")]
    pub viewport_height: u32,

    /// Visible region in logical image coordinates, as `left,top,right,bottom`.
    ///
    /// Defaults to the whole image.
    #[arg(long, value_parser = parse_rect, env = "REGION_TILES_VIEWPORT")]
    pub viewport: Option<Rect>,

    /// Stored rotation of the image in degrees (0, 90, 180 or 270).
    #[arg(long, default_value_t = 0, env = "REGION_TILES_ORIENTATION")]
    pub orientation: u32,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, env = "REGION_TILES_OUTPUT")]
    pub output: OutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ViewOptions {
    /// Validate the shared options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err("viewport width and height must be greater than 0".to_string());
        }

        if Orientation::from_degrees(self.orientation).is_none() {
            return Err(format!(
                "orientation must be 0, 90, 180 or 270 (got {})",
                self.orientation
            ));
        }

        if let Some(viewport) = self.viewport {
            if viewport.is_empty() {
                return Err(format!("viewport {} is empty", viewport));
            }
        }

        Ok(())
    }

    /// Stored rotation; rotation 0 if the degrees are invalid (call validate() first).
    pub fn orientation(&self) -> Orientation {
        Orientation::from_degrees(self.orientation).unwrap_or_default()
    }

    /// Requested viewport, or the whole logical image.
    pub fn viewport_or(&self, width: i32, height: i32) -> Rect {
        self.viewport.unwrap_or(Rect::from_size(width, height))
    }
}

/// Options for the `grid` subcommand.
#[derive(Args, Debug, Clone)]
pub struct GridConfig {
    /// Stored image width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Stored image height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Zoom scale (1.0 = one image pixel per screen pixel).
    #[arg(long, default_value_t = 1.0)]
    pub scale: f32,

    #[command(flatten)]
    pub view: ViewOptions,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.view.validate()?;

        if self.width == 0 || self.height == 0 {
            return Err("image width and height must be greater than 0".to_string());
        }
        if self.width > i32::MAX as u32 || self.height > i32::MAX as u32 {
            return Err(format!("image dimensions must not exceed {}", i32::MAX));
        }

        validate_scale(self.scale)
    }
}

/// Options for the `render` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Image file to decode.
    pub path: PathBuf,

    /// Zoom scale; repeat to replay a zoom sequence.
    #[arg(long = "scale", default_values_t = [1.0])]
    pub scales: Vec<f32>,

    /// Pixel format to decode into.
    #[arg(
        long,
        value_enum,
        default_value_t = PixelFormatArg::Rgba8,
        env = "REGION_TILES_PIXEL_FORMAT"
    )]
    pub pixel_format: PixelFormatArg,

    #[command(flatten)]
    pub view: ViewOptions,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.view.validate()?;

        if self.scales.is_empty() {
            return Err("at least one --scale is required".to_string());
        }
        self.scales.iter().try_for_each(|&scale| validate_scale(scale))
    }
}

fn validate_scale(scale: f32) -> Result<(), String> {
    if !scale.is_finite() || scale < 0.0 {
        return Err(format!("scale must be a finite number >= 0 (got {})", scale));
    }
    Ok(())
}

/// Parse `left,top,right,bottom` into a [`Rect`].
fn parse_rect(value: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = value
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid rectangle '{}': {}", value, e))?;

    match parts.as_slice() {
        &[left, top, right, bottom] => Ok(Rect::new(left, top, right, bottom)),
        _ => Err(format!(
            "invalid rectangle '{}': expected left,top,right,bottom",
            value
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
