//! CLI error handling with user-friendly messages.

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use tilecanvas::map::MapError;
use tilecanvas::provider::ProviderError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Invalid combination of arguments
    Args(String),
    /// Tile source could not be created
    Source(ProviderError),
    /// Async runtime could not be created
    Runtime(std::io::Error),
    /// Map could not be started
    Map(MapError),
    /// The view did not settle in time
    Timeout(Duration),
    /// Failed to write the output image
    Output { path: PathBuf, error: String },
}

impl CliError {
    /// Print the error and exit with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Timeout(_) = self {
            eprintln!();
            eprintln!("Tiles may still be downloading. Try a longer --timeout,");
            eprintln!("or check that the source serves the requested levels.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Args(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Source(e) => write!(f, "Failed to create tile source: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to create runtime: {}", e),
            CliError::Map(e) => write!(f, "Failed to start map: {}", e),
            CliError::Timeout(d) => write!(f, "View did not settle within {:?}", d),
            CliError::Output { path, error } => {
                write!(f, "Failed to write '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Source(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Map(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MapError> for CliError {
    fn from(e: MapError) -> Self {
        CliError::Map(e)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        CliError::Source(e)
    }
}
