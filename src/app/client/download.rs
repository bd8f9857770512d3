//! File download operations with atomic writes and streaming
//!
//! The body is streamed into `<destination>.tmp` and renamed into place only
//! once complete, so a timed-out or interrupted download never leaves a
//! truncated archive behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::app::client::http::HttpHandler;
use crate::constants::files;
use crate::errors::{FetchError, FetchResult};

/// File download operations handler
pub struct DownloadHandler<'a> {
    http_handler: &'a HttpHandler,
}

impl<'a> DownloadHandler<'a> {
    pub fn new(http_handler: &'a HttpHandler) -> Self {
        Self { http_handler }
    }

    /// Downloads `url` to `destination` within `timeout`
    ///
    /// Existing files are overwritten. On any failure the temporary file is
    /// removed and the destination is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if:
    /// - The URL is invalid
    /// - The HTTP request fails or answers with a non-success status
    /// - File I/O operations fail
    /// - The download does not finish within `timeout`
    pub async fn download_file(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> FetchResult<u64> {
        let parsed_url = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_path_for(destination);

        let attempt = tokio::time::timeout(
            timeout,
            self.download_file_attempt(&parsed_url, &temp_path),
        )
        .await;

        let bytes = match attempt {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                remove_temp(&temp_path).await;
                return Err(e);
            }
            Err(_) => {
                remove_temp(&temp_path).await;
                return Err(FetchError::Timeout {
                    seconds: timeout.as_secs(),
                });
            }
        };

        tokio::fs::rename(&temp_path, destination)
            .await
            .map_err(|_e| FetchError::AtomicOperationFailed {
                temp_path: temp_path.clone(),
                final_path: destination.to_path_buf(),
            })?;

        tracing::debug!("Downloaded {} bytes to {}", bytes, destination.display());
        Ok(bytes)
    }

    async fn download_file_attempt(&self, url: &Url, temp_path: &Path) -> FetchResult<u64> {
        let response = self.http_handler.get_response(url).await?;

        let mut file = File::create(temp_path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// `archive.tar` becomes `archive.tar.tmp`
pub(crate) fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(files::TEMP_FILE_SUFFIX);
    PathBuf::from(name)
}

async fn remove_temp(temp_path: &Path) {
    if tokio::fs::try_exists(temp_path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(temp_path).await {
            tracing::warn!("Failed to remove {}: {}", temp_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::app::client::config::ClientConfig;

    fn create_test_handler() -> HttpHandler {
        let client = ClientConfig::default().build_http_client().unwrap();
        HttpHandler::new(client, 5).unwrap()
    }

    #[test]
    fn test_temp_file_path_generation() {
        let temp = temp_path_for(Path::new("/tmp/00001_tile.tar"));
        assert_eq!(temp, PathBuf::from("/tmp/00001_tile.tar.tmp"));

        let temp = temp_path_for(Path::new("/tmp/archive"));
        assert!(temp.to_string_lossy().ends_with("archive.tmp"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_io() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("nested").join("tile.tar");

        let http_handler = create_test_handler();
        let handler = DownloadHandler::new(&http_handler);
        let result = handler
            .download_file("not-a-url", &destination, Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
        assert!(!destination.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_leaves_no_files() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("tile.tar");

        let http_handler = create_test_handler();
        let handler = DownloadHandler::new(&http_handler);
        // Port 9 on loopback is closed on any sane test host
        let result = handler
            .download_file("http://127.0.0.1:9/tile.tar", &destination, Duration::from_secs(5))
            .await;

        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(!temp_path_for(&destination).exists());
    }
}
