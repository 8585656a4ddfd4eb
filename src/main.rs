//! Region Tiles - incremental tile loading for very large images.
//!
//! This binary inspects tile grids and replays viewport requests against an
//! image file.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use region_tiles::{
    config::{Cli, Command, GridConfig, OutputFormat, RenderConfig},
    sample_size_for_scale, CacheStats, Grid, ImageFileSource, Orientation, OrientationCorrector,
    Rect, TileId, TileProvider, TileRef,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.command.view().verbose);

    // Validate configuration
    if let Err(e) = cli.command.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Grid(config) => run_grid(config),
        Command::Render(config) => run_render(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "region_tiles=debug"
    } else {
        "region_tiles=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Print a report as pretty JSON, or with `text` otherwise.
fn emit<T: Serialize>(output: OutputFormat, report: &T, text: impl FnOnce(&T)) -> ExitCode {
    match output {
        OutputFormat::Text => {
            text(report);
            ExitCode::SUCCESS
        }
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

// =============================================================================
// Grid Command
// =============================================================================

#[derive(Debug, Serialize)]
struct GridReport {
    raw_width: i32,
    raw_height: i32,
    width: i32,
    height: i32,
    orientation: Orientation,
    scale: f32,
    sample_size: u32,
    columns: usize,
    rows: usize,
    viewport: Rect,
    tiles: Vec<GridTileReport>,
}

#[derive(Debug, Serialize)]
struct GridTileReport {
    index: usize,
    rect: Rect,
    raw_rect: Rect,
    decoded_width: i32,
    decoded_height: i32,
    visible: bool,
}

fn run_grid(config: GridConfig) -> ExitCode {
    let view = &config.view;
    // validate() guarantees both fit in i32
    let corrector =
        OrientationCorrector::new(view.orientation(), config.width as i32, config.height as i32);
    let (width, height) = corrector.logical_size();
    let viewport = view.viewport_or(width, height);

    let sample_size = sample_size_for_scale(config.scale);
    let grid = Grid::generate(
        sample_size,
        0,
        view.viewport_width,
        view.viewport_height,
        width,
        height,
    );
    let (columns, rows) = grid.dimensions();

    let tiles = grid
        .tiles()
        .iter()
        .enumerate()
        .map(|(index, tile)| {
            let rect = tile.rect();
            GridTileReport {
                index,
                rect,
                raw_rect: corrector.to_raw_rect(&rect),
                decoded_width: rect.width() / sample_size as i32,
                decoded_height: rect.height() / sample_size as i32,
                visible: rect.intersects(&viewport),
            }
        })
        .collect();

    let report = GridReport {
        raw_width: config.width as i32,
        raw_height: config.height as i32,
        width,
        height,
        orientation: view.orientation(),
        scale: config.scale,
        sample_size,
        columns,
        rows,
        viewport,
        tiles,
    };

    emit(view.output, &report, |report| {
        println!(
            "Image {}x{} (stored {}x{}, rotated {})",
            report.width,
            report.height,
            report.raw_width,
            report.raw_height,
            report.orientation.degrees()
        );
        println!(
            "Scale {} -> sample size {}: {} columns x {} rows",
            report.scale, report.sample_size, report.columns, report.rows
        );
        println!("Viewport {}", report.viewport);
        println!("──────────────────────────────────────────────────────────");
        for tile in &report.tiles {
            println!(
                "{} {:>5}  {}  raw {}  decoded {}x{}",
                if tile.visible { "*" } else { " " },
                tile.index,
                tile.rect,
                tile.raw_rect,
                tile.decoded_width,
                tile.decoded_height
            );
        }
        let visible = report.tiles.iter().filter(|t| t.visible).count();
        println!("──────────────────────────────────────────────────────────");
        println!("{} of {} tile(s) visible", visible, report.tiles.len());
    })
}

// =============================================================================
// Render Command
// =============================================================================

#[derive(Debug, Serialize)]
struct RenderReport {
    path: String,
    raw_width: i32,
    raw_height: i32,
    width: i32,
    height: i32,
    orientation: Orientation,
    steps: Vec<StepReport>,
    published: usize,
}

#[derive(Debug, Serialize)]
struct StepReport {
    scale: f32,
    sample_size: u32,
    viewport: Rect,
    tiles: Vec<VisibleTileReport>,
    stats: CacheStats,
}

#[derive(Debug, Serialize)]
struct VisibleTileReport {
    id: TileId,
    rect: Rect,
    width: u32,
    height: u32,
    bytes: usize,
}

impl From<&TileRef<'_>> for VisibleTileReport {
    fn from(tile: &TileRef<'_>) -> Self {
        let pixels = tile.pixels();
        Self {
            id: tile.id(),
            rect: tile.rect(),
            width: pixels.width(),
            height: pixels.height(),
            bytes: pixels.byte_len(),
        }
    }
}

async fn run_render(config: RenderConfig) -> ExitCode {
    let view = &config.view;
    let source = ImageFileSource::new(&config.path).with_orientation(view.orientation());

    let published = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&published);
    let mut provider = match TileProvider::open(source, move |tiles: &[TileRef<'_>]| {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(visible = tiles.len(), "Tiles changed");
    })
    .await
    {
        Ok(provider) => provider,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = provider.set_preferred_pixel_format(config.pixel_format.preferred()) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let viewport = view.viewport_or(provider.width(), provider.height());
    let mut steps = Vec::with_capacity(config.scales.len());

    for &scale in &config.scales {
        let step = match replay(
            &mut provider,
            scale,
            view.viewport_width,
            view.viewport_height,
            viewport,
        )
        .await
        {
            Ok(step) => step,
            Err(e) => {
                error!(scale, "Render failed: {}", e);
                return ExitCode::FAILURE;
            }
        };
        info!(
            scale,
            sample_size = step.sample_size,
            tiles = step.tiles.len(),
            resident_bytes = step.stats.resident_bytes,
            "Viewport settled"
        );
        steps.push(step);
    }

    let (raw_width, raw_height) = provider.raw_size();
    let report = RenderReport {
        path: config.path.display().to_string(),
        raw_width,
        raw_height,
        width: provider.width(),
        height: provider.height(),
        orientation: provider.orientation(),
        steps,
        published: published.load(Ordering::Relaxed),
    };

    if let Err(e) = provider.dispose() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    emit(view.output, &report, |report| {
        println!(
            "{}: {}x{} (stored {}x{}, rotated {})",
            report.path,
            report.width,
            report.height,
            report.raw_width,
            report.raw_height,
            report.orientation.degrees()
        );
        for step in &report.steps {
            println!();
            println!(
                "Scale {} (sample size {}), viewport {}",
                step.scale, step.sample_size, step.viewport
            );
            println!("──────────────────────────────────────────────────────────");
            for tile in &step.tiles {
                println!(
                    "  level {:>3} #{:<5} {}  {}x{}  {} bytes",
                    tile.id.level, tile.id.index, tile.rect, tile.width, tile.height, tile.bytes
                );
            }
            println!(
                "  {} tile(s) visible, {} level(s) cached, {} bytes resident",
                step.tiles.len(),
                step.stats.levels,
                step.stats.resident_bytes
            );
        }
        println!();
        println!("{} publish notification(s)", report.published);
    })
}

/// Request one viewport, wait for its decodes, and report what is visible.
async fn replay(
    provider: &mut TileProvider,
    scale: f32,
    viewport_width: u32,
    viewport_height: u32,
    viewport: Rect,
) -> Result<StepReport, region_tiles::TileError> {
    provider.request_tiles(scale, viewport_width, viewport_height, viewport)?;
    provider.settle().await?;

    // Second pass sees every decoded tile as a hit and evicts other levels
    let tiles = provider
        .request_tiles(scale, viewport_width, viewport_height, viewport)?
        .iter()
        .map(VisibleTileReport::from)
        .collect();

    Ok(StepReport {
        scale,
        sample_size: sample_size_for_scale(scale),
        viewport,
        tiles,
        stats: provider.stats(),
    })
}
