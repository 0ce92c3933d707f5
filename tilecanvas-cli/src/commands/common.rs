//! Arguments and helpers shared across CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tilecanvas::map::ViewState;
use tilecanvas::provider::{AsyncReqwestClient, FileTileSource, HttpTileSource, TileSource};

use crate::error::CliError;

/// Pyramid geometry.
#[derive(Debug, Clone, Args)]
pub struct GeometryArgs {
    /// Number of pyramid levels (the last one is full resolution)
    #[arg(long)]
    pub levels: u8,

    /// Full-resolution width in pixels
    #[arg(long)]
    pub width: u32,

    /// Full-resolution height in pixels
    #[arg(long)]
    pub height: u32,

    /// Tile edge length in pixels
    #[arg(long, default_value = "256")]
    pub tile_size: u32,
}

/// The view to resolve or render.
#[derive(Debug, Clone, Args)]
pub struct ViewArgs {
    /// Scale, 1.0 being full resolution
    #[arg(long, default_value = "1.0")]
    pub scale: f64,

    /// Rotation in degrees
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    pub rotation: f64,

    /// Horizontal scroll in scaled pixels
    #[arg(long, default_value = "0.0")]
    pub scroll_x: f64,

    /// Vertical scroll in scaled pixels
    #[arg(long, default_value = "0.0")]
    pub scroll_y: f64,

    /// View width in pixels
    #[arg(long, default_value = "1024")]
    pub view_width: u32,

    /// View height in pixels
    #[arg(long, default_value = "768")]
    pub view_height: u32,
}

impl ViewArgs {
    /// A view pinned at exactly `self.scale`.
    pub fn view_state(&self, geometry: &GeometryArgs) -> Result<ViewState, CliError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(CliError::Args(format!(
                "--scale must be positive (got {})",
                self.scale
            )));
        }
        if self.view_width == 0 || self.view_height == 0 {
            return Err(CliError::Args("view size must be non-zero".to_string()));
        }
        let mut view = ViewState::new(geometry.width, geometry.height, self.scale, self.scale, 0);
        view.set_layout_size(self.view_width, self.view_height);
        view.set_scale(self.scale);
        view.set_rotation(self.rotation);
        view.set_scroll(self.scroll_x, self.scroll_y);
        Ok(view)
    }
}

/// Build a tile source from a directory and pattern, or a URL template.
///
/// Returns `None` when neither is given.
pub fn build_source(
    tiles: Option<&PathBuf>,
    pattern: Option<&str>,
    url: Option<&str>,
) -> Result<Option<Arc<dyn TileSource>>, CliError> {
    match (tiles, url) {
        (Some(_), Some(_)) => Err(CliError::Args(
            "a directory and a URL cannot be used for the same layer".to_string(),
        )),
        (Some(dir), None) => {
            let source = match pattern {
                Some(pattern) => FileTileSource::with_template(dir, pattern)?,
                None => FileTileSource::new(dir),
            };
            Ok(Some(Arc::new(source)))
        }
        (None, Some(url)) => {
            let source = HttpTileSource::new(AsyncReqwestClient::new()?, url)?;
            Ok(Some(Arc::new(source)))
        }
        (None, None) => Ok(None),
    }
}
