//! Tile Fetch Unit
//!
//! One fetch is one download followed by one extraction. The outcome is
//! tri-state and every error is folded into it; nothing escapes to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::app::archive::extract_member;
use crate::app::client::DemClient;
use crate::app::models::{TileDescriptor, TileOutcome};
use crate::errors::FetchError;

/// Fetches a single tile and reports its outcome
///
/// Implementations must not share mutable state between calls; the
/// coordinator runs many fetches concurrently.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, descriptor: &TileDescriptor, timeout: Duration) -> TileOutcome;
}

/// Downloads a tile archive over HTTP and extracts its elevation raster
pub struct ArchiveTileFetcher {
    client: Arc<DemClient>,
    work_dir: PathBuf,
    member_extension: &'static str,
}

impl ArchiveTileFetcher {
    /// `member_extension` is the raster extension inside each archive (tif, dt1, dt2)
    pub fn new(
        client: Arc<DemClient>,
        work_dir: impl Into<PathBuf>,
        member_extension: &'static str,
    ) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
            member_extension,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[async_trait]
impl TileFetcher for ArchiveTileFetcher {
    async fn fetch(&self, descriptor: &TileDescriptor, timeout: Duration) -> TileOutcome {
        let archive_path = descriptor.archive_path(&self.work_dir);

        if let Err(e) = self
            .client
            .download_to_file(&descriptor.remote_url, &archive_path, timeout)
            .await
        {
            debug!("Tile {} download failed: {}", descriptor.id, e);
            return TileOutcome::download_failed(descriptor.id);
        }

        let member = descriptor.raster_member(self.member_extension);
        let fragment_path = descriptor.fragment_path(&self.work_dir, self.member_extension);
        match extract_blocking(archive_path.clone(), member, fragment_path).await {
            Ok(path) => {
                if let Err(e) = tokio::fs::remove_file(&archive_path).await {
                    warn!("Failed to remove archive {}: {}", archive_path.display(), e);
                }
                debug!("Tile {} ready at {}", descriptor.id, path.display());
                TileOutcome::success(descriptor.id, path)
            }
            Err(e) => {
                debug!("Tile {} extraction failed: {}", descriptor.id, e);
                TileOutcome::extract_failed(descriptor.id)
            }
        }
    }
}

/// Tar reading is synchronous; keep it off the async workers
async fn extract_blocking(
    archive: PathBuf,
    member: String,
    destination: PathBuf,
) -> Result<PathBuf, FetchError> {
    tokio::task::spawn_blocking(move || extract_member(&archive, &member, &destination))
        .await
        .map_err(|e| FetchError::Extraction {
            archive: PathBuf::new(),
            reason: format!("extraction task failed: {}", e),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::TileStatus;
    use tempfile::tempdir;

    fn descriptor(url: &str) -> TileDescriptor {
        TileDescriptor {
            id: 3,
            remote_url: url.to_string(),
            local_archive_name: "Copernicus_DSM_10_N47_00_E008_00.tar".to_string(),
            grid_cell_code: "N47_00_E008_00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unreachable_url_is_download_failure() {
        let dir = tempdir().unwrap();
        let client = Arc::new(DemClient::new().unwrap());
        let fetcher = ArchiveTileFetcher::new(client, dir.path(), "tif");

        let outcome = fetcher
            .fetch(&descriptor("http://127.0.0.1:9/x.tar"), Duration::from_secs(5))
            .await;

        assert_eq!(outcome.status, TileStatus::DownloadFailed);
        assert!(outcome.extracted_path.is_none());
        assert_eq!(outcome.id, 3);
    }

    #[tokio::test]
    async fn test_invalid_url_is_download_failure() {
        let dir = tempdir().unwrap();
        let client = Arc::new(DemClient::new().unwrap());
        let fetcher = ArchiveTileFetcher::new(client, dir.path(), "tif");

        let outcome = fetcher
            .fetch(&descriptor("not a url"), Duration::from_secs(1))
            .await;
        assert_eq!(outcome.status, TileStatus::DownloadFailed);
    }

    #[tokio::test]
    async fn test_extract_blocking_reports_missing_member() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("a.tar");
        crate::app::archive::tests::build_archive(&archive, &[("a/DEM/b.tif", b"x")]);

        let result = extract_blocking(
            archive,
            "a/DEM/c.tif".to_string(),
            dir.path().join("c.tif"),
        )
        .await;
        assert!(matches!(result, Err(FetchError::MissingMember { .. })));
    }
}
