//! Location templates for tile sources.
//!
//! Templates contain `{zoom}`, `{row}` and `{col}` placeholders, for example
//! `https://tiles.example.com/{zoom}/{row}/{col}.jpg` or `{zoom}/{row}_{col}.png`.

use super::types::ProviderError;

const PLACEHOLDERS: [&str; 3] = ["{zoom}", "{row}", "{col}"];

/// A validated tile location template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileTemplate {
    template: String,
}

impl TileTemplate {
    /// Parse a template, requiring all three placeholders.
    pub fn parse(template: impl Into<String>) -> Result<Self, ProviderError> {
        let template = template.into();
        for placeholder in PLACEHOLDERS {
            if !template.contains(placeholder) {
                return Err(ProviderError::InvalidTemplate {
                    reason: format!("missing {}", placeholder),
                    template,
                });
            }
        }
        Ok(Self { template })
    }

    /// The default layout for file-system pyramids.
    pub(crate) fn default_file() -> Self {
        Self {
            template: super::file::DEFAULT_FILE_TEMPLATE.to_string(),
        }
    }

    /// Expand the template for a tile.
    pub fn expand(&self, row: u32, col: u32, zoom: u8) -> String {
        self.template
            .replace("{zoom}", &zoom.to_string())
            .replace("{row}", &row.to_string())
            .replace("{col}", &col.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}
