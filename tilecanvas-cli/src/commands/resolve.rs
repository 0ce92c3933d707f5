//! Print the tiles visible in a view.

use clap::Args;
use tilecanvas::resolver::{LevelPolicy, VisibleTilesResolver};
use tilecanvas::tile::TileSpec;

use super::common::{GeometryArgs, ViewArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub geometry: GeometryArgs,

    #[command(flatten)]
    pub view: ViewArgs,

    /// Bias level selection towards coarser levels
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub magnifying_factor: i32,

    /// Never decode downsampled buffers
    #[arg(long)]
    pub no_sub_sampling: bool,
}

/// Resolve the view and list its specs, sorted by row then column.
pub fn resolve_specs(args: &ResolveArgs) -> Result<(u8, u8, Vec<TileSpec>), CliError> {
    let geometry = &args.geometry;
    if geometry.levels == 0 || geometry.tile_size == 0 || geometry.width == 0 || geometry.height == 0 {
        return Err(CliError::Args(
            "levels, tile size and dimensions must be non-zero".to_string(),
        ));
    }

    let view = args.view.view_state(geometry)?;
    let policy = LevelPolicy {
        magnifying_factor: args.magnifying_factor,
        sub_sampling: !args.no_sub_sampling,
    };
    let resolver = VisibleTilesResolver::new(
        geometry.levels,
        geometry.width,
        geometry.height,
        geometry.tile_size,
        policy,
    );

    let level = resolver.level_for_scale(view.scale());
    let sub_sample = resolver.sub_sample_for_scale(view.scale());
    let mut specs: Vec<TileSpec> = match view.viewport() {
        Some(viewport) => resolver.resolve(&viewport, view.scale()).into_iter().collect(),
        None => Vec::new(),
    };
    specs.sort_by_key(|s| (s.row(), s.col()));
    Ok((level, sub_sample, specs))
}

pub fn run(args: ResolveArgs) -> Result<(), CliError> {
    let (level, sub_sample, specs) = resolve_specs(&args)?;

    println!(
        "Level {} (sub-sample {}): {} tiles",
        level,
        sub_sample,
        specs.len()
    );
    for spec in specs {
        println!("  {}", spec);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(scale: f64, scroll: (f64, f64)) -> ResolveArgs {
        ResolveArgs {
            geometry: GeometryArgs {
                levels: 4,
                width: 2048,
                height: 2048,
                tile_size: 256,
            },
            view: ViewArgs {
                scale,
                rotation: 0.0,
                scroll_x: scroll.0,
                scroll_y: scroll.1,
                view_width: 512,
                view_height: 512,
            },
            magnifying_factor: 0,
            no_sub_sampling: false,
        }
    }

    #[test]
    fn test_full_resolution_corner() {
        let (level, sub_sample, specs) = resolve_specs(&args(1.0, (0.0, 0.0))).unwrap();
        assert_eq!((level, sub_sample), (3, 0));
        assert_eq!(
            specs,
            vec![
                TileSpec::new(3, 0, 0),
                TileSpec::new(3, 0, 1),
                TileSpec::new(3, 1, 0),
                TileSpec::new(3, 1, 1),
            ]
        );
    }

    #[test]
    fn test_half_scale_picks_coarser_level() {
        let (level, _, specs) = resolve_specs(&args(0.5, (0.0, 0.0))).unwrap();
        assert_eq!(level, 2);
        assert_eq!(specs.len(), 4);
        assert!(specs.iter().all(|s| s.zoom() == 2));
    }

    #[test]
    fn test_zero_levels_rejected() {
        let mut bad = args(1.0, (0.0, 0.0));
        bad.geometry.levels = 0;
        assert!(matches!(resolve_specs(&bad), Err(CliError::Args(_))));
    }
}
