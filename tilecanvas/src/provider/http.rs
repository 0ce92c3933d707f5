//! HTTP tile source and client abstraction for testability

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use tracing::trace;

use super::template::TileTemplate;
use super::types::{BoxFuture, ProviderError, TileSource};

/// Default request timeout for tile downloads.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Trait for async HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait AsyncHttpClient: Send + Sync + 'static {
    /// Performs an HTTP GET request.
    ///
    /// # Returns
    ///
    /// The response body, `None` for a 404, or an error for any other
    /// failure.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, ProviderError>>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a new client with the default timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT_SECS)
    }

    /// Creates a new client with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, ProviderError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ProviderError::Http(format!("Request failed: {}", e)))?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if !response.status().is_success() {
                return Err(ProviderError::Http(format!(
                    "HTTP {} from {}",
                    response.status(),
                    url
                )));
            }

            response
                .bytes()
                .await
                .map(Some)
                .map_err(|e| ProviderError::Http(format!("Failed to read response: {}", e)))
        })
    }
}

/// Tile source downloading tiles from a URL template.
///
/// # Example
///
/// ```no_run
/// use tilecanvas::provider::{AsyncReqwestClient, HttpTileSource};
///
/// let client = AsyncReqwestClient::new().unwrap();
/// let source = HttpTileSource::new(client, "https://tiles.example.com/{zoom}/{row}/{col}.jpg").unwrap();
/// ```
pub struct HttpTileSource<C: AsyncHttpClient> {
    client: C,
    template: TileTemplate,
    name: String,
}

impl<C: AsyncHttpClient> HttpTileSource<C> {
    /// Creates a source over `client` using the given URL template.
    pub fn new(client: C, url_template: &str) -> Result<Self, ProviderError> {
        let template = TileTemplate::parse(url_template)?;
        Ok(Self {
            client,
            name: format!("http:{}", template.as_str()),
            template,
        })
    }

    /// Builds the tile URL for the given coordinates.
    fn build_url(&self, row: u32, col: u32, zoom: u8) -> String {
        self.template.expand(row, col, zoom)
    }
}

impl<C: AsyncHttpClient> TileSource for HttpTileSource<C> {
    fn fetch(&self, row: u32, col: u32, zoom: u8) -> BoxFuture<'_, Result<Option<Bytes>, ProviderError>> {
        Box::pin(async move {
            let url = self.build_url(row, col, zoom);
            trace!(url = %url, "Fetching tile");
            self.client.get(&url).await
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
