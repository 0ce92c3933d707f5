//! TileCanvas CLI - Command-line interface
//!
//! Resolves the visible tiles of a view, or renders a view of a tile pyramid
//! to a PNG file.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tilecanvas::logging::{init_logging, LogConfig};

use crate::commands::{render, resolve};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "tilecanvas")]
#[command(version = tilecanvas::VERSION)]
#[command(about = "Resolve and render views of multi-resolution tile pyramids", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tiles visible in a view
    Resolve(resolve::ResolveArgs),
    /// Fetch the tiles of a view and write the composite to a PNG file
    Render(render::RenderArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let mut log_config = LogConfig::default().with_level(level);
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_file(path);
    }
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };

    let result = match cli.command {
        Command::Resolve(args) => resolve::run(args),
        Command::Render(args) => render::run(args),
    };

    if let Err(e) = result {
        e.exit();
    }
}
