//! Render a view of a tile pyramid to a PNG file.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tilecanvas::canvas::RenderSnapshot;
use tilecanvas::layer::Layer;
use tilecanvas::map::{MapConfig, MapState, ViewState};
use tracing::info;

use super::common::{build_source, GeometryArgs, ViewArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub geometry: GeometryArgs,

    #[command(flatten)]
    pub view: ViewArgs,

    /// Directory holding the base layer tiles
    #[arg(long)]
    pub tiles: Option<PathBuf>,

    /// Tile path pattern under --tiles, with {zoom}, {row} and {col}
    #[arg(long)]
    pub pattern: Option<String>,

    /// URL template of the base layer, with {zoom}, {row} and {col}
    #[arg(long)]
    pub url: Option<String>,

    /// Directory holding overlay tiles
    #[arg(long)]
    pub overlay_tiles: Option<PathBuf>,

    /// Tile path pattern under --overlay-tiles
    #[arg(long)]
    pub overlay_pattern: Option<String>,

    /// URL template of the overlay layer
    #[arg(long)]
    pub overlay_url: Option<String>,

    /// Blend weight of the overlay layer
    #[arg(long, default_value = "0.5")]
    pub overlay_alpha: f32,

    /// Number of tile workers (default: CPU cores - 1)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seconds to wait for the view to settle
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Output PNG path
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn run(args: RenderArgs) -> Result<(), CliError> {
    let base = build_source(args.tiles.as_ref(), args.pattern.as_deref(), args.url.as_deref())?
        .ok_or_else(|| CliError::Args("--tiles or --url is required".to_string()))?;
    let overlay = build_source(
        args.overlay_tiles.as_ref(),
        args.overlay_pattern.as_deref(),
        args.overlay_url.as_deref(),
    )?;

    let geometry = &args.geometry;
    let view = args.view.view_state(geometry)?;
    let mut config = MapConfig::new(geometry.levels, geometry.width, geometry.height)
        .with_tile_size(geometry.tile_size)
        .with_scale_range(args.view.scale, args.view.scale);
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
    }
    let timeout = Duration::from_secs(args.timeout);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let snapshot = runtime.block_on(async {
        let map = MapState::new(config, base.clone())?;
        if let Some(overlay) = overlay {
            map.set_layers(vec![
                Layer::new(base),
                Layer::new(overlay).with_alpha(args.overlay_alpha),
            ]);
        }

        map.set_layout_size(args.view.view_width, args.view.view_height);
        map.set_scale(args.view.scale);
        map.set_rotation(args.view.rotation);
        let (scroll_x, scroll_y) = view.scroll();
        map.set_scroll(scroll_x, scroll_y).await;

        let settled = tokio::time::timeout(timeout, map.wait_settled()).await;
        let metrics = map.metrics().snapshot();
        map.shutdown_and_wait().await;

        info!(%metrics, "Render finished");
        settled.map_err(|_| CliError::Timeout(timeout))
    })?;

    let image = compose(&snapshot, &view, geometry);
    image.save(&args.output).map_err(|e| CliError::Output {
        path: args.output.clone(),
        error: e.to_string(),
    })?;

    println!(
        "Wrote {} ({} tiles at level {})",
        args.output.display(),
        snapshot.len(),
        snapshot.level.map_or("-".to_string(), |l| l.to_string())
    );
    Ok(())
}

/// Draw the snapshot's tiles, in order, onto an unrotated image of the
/// view's layout size.
pub fn compose(snapshot: &RenderSnapshot, view: &ViewState, geometry: &GeometryArgs) -> RgbaImage {
    let (width, height) = view.layout_size().unwrap_or((1, 1));
    let mut canvas = RgbaImage::new(width, height);
    let scale = view.scale();
    let (scroll_x, scroll_y) = view.scroll();

    for tile in snapshot.iter() {
        let region = tile.region(geometry.tile_size, geometry.levels);
        let left = (region.left as f64 * scale - scroll_x).round();
        let top = (region.top as f64 * scale - scroll_y).round();
        let right = (region.right as f64 * scale - scroll_x).round();
        let bottom = (region.bottom as f64 * scale - scroll_y).round();
        let dest_w = (right - left).max(1.0) as u32;
        let dest_h = (bottom - top).max(1.0) as u32;

        let buffer = &tile.buffer;
        let source = RgbaImage::from_fn(buffer.width(), buffer.height(), |x, y| {
            Rgba(buffer.pixel(x, y).unwrap_or([0, 0, 0, 0]))
        });
        let scaled = if (source.width(), source.height()) == (dest_w, dest_h) {
            source
        } else {
            imageops::resize(&source, dest_w, dest_h, FilterType::Triangle)
        };
        imageops::overlay(&mut canvas, &scaled, left as i64, top as i64);
    }
    canvas
}
