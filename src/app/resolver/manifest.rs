//! Remote tile manifest retrieval and parsing
//!
//! A manifest lists every downloadable archive for one dataset. Listings come
//! as CSV, plain text or XML depending on the mirror, so parsing is
//! deliberately format-agnostic: the body is split into tokens and every
//! absolute URL ending in `.tar` is kept.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::app::client::DemClient;
use crate::app::models::{ProductType, Resolution};
use crate::constants::copernicus;
use crate::errors::{ResolutionError, ResolutionResult};

/// Something that can produce the raw text of a manifest
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(&self, url: &str) -> ResolutionResult<String>;
}

#[async_trait]
impl ManifestSource for DemClient {
    async fn fetch_manifest(&self, url: &str) -> ResolutionResult<String> {
        self.get_text(url)
            .await
            .map_err(|e| ResolutionError::ManifestUnavailable {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Manifest URL for a dataset under `base_url`
///
/// e.g. `<base>/COP-DEM_GLO-30-DGED__2023_1`
pub fn manifest_url(base_url: &str, resolution: Resolution, product: ProductType) -> String {
    format!(
        "{}/COP-DEM_{}-{}__{}",
        base_url.trim_end_matches('/'),
        resolution.dataset_name(),
        product,
        copernicus::DATASET_RELEASE
    )
}

/// One downloadable archive from the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub url: String,
    pub archive_name: String,
    pub cell_code: String,
}

impl ManifestEntry {
    /// Parse a manifest token, `None` if it is not a tile archive URL
    pub fn from_url(token: &str) -> Option<Self> {
        let lower = token.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://"))
            || !lower.ends_with(copernicus::ARCHIVE_EXTENSION)
        {
            return None;
        }

        let archive_name = token.rsplit('/').next()?.to_string();
        let base = archive_name.strip_suffix(copernicus::ARCHIVE_EXTENSION)?;
        let cell_code = cell_code_from_base(base)?;

        Some(Self {
            url: token.to_string(),
            archive_name,
            cell_code,
        })
    }
}

/// Trailing `N47_00_E008_00` style code of an archive base name
fn cell_code_from_base(base: &str) -> Option<String> {
    let parts: Vec<&str> = base.split('_').collect();
    if parts.len() < 4 {
        return None;
    }
    let code = &parts[parts.len() - 4..];
    let lat_ok = code[0].starts_with(['N', 'S']) && code[0].len() == 3;
    let lon_ok = code[2].starts_with(['E', 'W']) && code[2].len() == 4;
    let digits_ok = code
        .iter()
        .all(|p| p.chars().skip_while(|c| c.is_ascii_alphabetic()).all(|c| c.is_ascii_digit()));

    (lat_ok && lon_ok && digits_ok).then(|| code.join("_"))
}

/// Parsed manifest, keyed by cell code
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    by_cell: HashMap<String, usize>,
}

impl Manifest {
    /// Parse a manifest body
    ///
    /// Fails when no archive URL can be found, which covers empty bodies,
    /// HTML error pages and unrelated documents.
    pub fn parse(body: &str, url: &str) -> ResolutionResult<Self> {
        let mut manifest = Manifest::default();
        let mut duplicates = 0usize;

        let tokens = body.split(|c: char| {
            c.is_whitespace() || matches!(c, ',' | ';' | '"' | '\'' | '<' | '>')
        });

        for token in tokens.filter(|t| !t.is_empty()) {
            let Some(entry) = ManifestEntry::from_url(token) else {
                continue;
            };
            if manifest.by_cell.contains_key(&entry.cell_code) {
                duplicates += 1;
                continue;
            }
            manifest
                .by_cell
                .insert(entry.cell_code.clone(), manifest.entries.len());
            manifest.entries.push(entry);
        }

        if manifest.entries.is_empty() {
            return Err(ResolutionError::ManifestUnparseable {
                url: url.to_string(),
                reason: "no tile archive URLs found".to_string(),
            });
        }
        if duplicates > 0 {
            warn!("Manifest lists {} duplicate cells; first entry kept", duplicates);
        }

        debug!("Parsed manifest with {} archives", manifest.entries.len());
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Archive for a cell code
    pub fn lookup(&self, cell_code: &str) -> Option<&ManifestEntry> {
        self.by_cell.get(cell_code).map(|&i| &self.entries[i])
    }
}
