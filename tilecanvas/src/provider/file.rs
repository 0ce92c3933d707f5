//! File-system tile source.
//!
//! Reads pre-rendered pyramid tiles laid out under a root directory, for
//! example `tiles/{zoom}/{row}/{col}.jpg`. Reads are performed using
//! `spawn_blocking` to avoid blocking the async runtime.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::trace;

use super::template::TileTemplate;
use super::types::{BoxFuture, ProviderError, TileSource};

/// Default relative path template.
pub const DEFAULT_FILE_TEMPLATE: &str = "{zoom}/{row}/{col}.jpg";

/// Tile source backed by a directory tree.
///
/// A missing file means "no tile here" and is not an error.
#[derive(Debug, Clone)]
pub struct FileTileSource {
    root: PathBuf,
    template: TileTemplate,
    name: String,
}

impl FileTileSource {
    /// Creates a source using [`DEFAULT_FILE_TEMPLATE`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            name: format!("file:{}", root.display()),
            root,
            template: TileTemplate::default_file(),
        }
    }

    /// Creates a source with a custom relative path template.
    pub fn with_template(root: impl Into<PathBuf>, template: &str) -> Result<Self, ProviderError> {
        let root = root.into();
        Ok(Self {
            name: format!("file:{}", root.display()),
            root,
            template: TileTemplate::parse(template)?,
        })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Constructs the path for a tile file.
    fn tile_path(&self, row: u32, col: u32, zoom: u8) -> PathBuf {
        self.root.join(self.template.expand(row, col, zoom))
    }
}

impl TileSource for FileTileSource {
    fn fetch(&self, row: u32, col: u32, zoom: u8) -> BoxFuture<'_, Result<Option<Bytes>, ProviderError>> {
        let path = self.tile_path(row, col, zoom);
        Box::pin(async move {
            trace!(path = %path.display(), "Reading tile");
            let result = tokio::task::spawn_blocking(move || std::fs::read(&path))
                .await
                .map_err(|e| ProviderError::Io(format!("Read task failed: {}", e)))?;

            match result {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
