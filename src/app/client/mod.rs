//! HTTP client for the elevation tile host
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: rate-limited request primitives
//! - `download`: file downloads with atomic writes

use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::errors::{FetchError, FetchResult, Result};

pub mod config;
pub mod download;
pub mod http;

pub use config::ClientConfig;

use download::DownloadHandler;
use http::HttpHandler;

/// HTTP client shared by the resolver and every fetch worker
///
/// Cloning is not needed; share it behind an `Arc` so all workers draw from
/// the same rate limiter.
#[derive(Debug)]
pub struct DemClient {
    http_handler: HttpHandler,
    manifest_timeout: Duration,
}

impl DemClient {
    /// Creates a client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client with custom configuration
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps)?;

        tracing::debug!(
            "Created tile host client ({} req/s)",
            config.rate_limit_rps
        );

        Ok(Self {
            http_handler,
            manifest_timeout: config.manifest_timeout,
        })
    }

    /// Fetches a text document such as a manifest listing
    pub async fn get_text(&self, url: &str) -> FetchResult<String> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        match tokio::time::timeout(self.manifest_timeout, self.http_handler.get_text(&parsed)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                seconds: self.manifest_timeout.as_secs(),
            }),
        }
    }

    /// Downloads `url` to `destination` within `timeout`, returning the byte count
    ///
    /// Uses the temp file + rename pattern; see [`DownloadHandler::download_file`].
    pub async fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> FetchResult<u64> {
        DownloadHandler::new(&self.http_handler)
            .download_file(url, destination, timeout)
            .await
    }
}
