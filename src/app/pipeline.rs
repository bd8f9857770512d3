//! End-to-end tile acquisition pipeline
//!
//! resolve -> fetch with retries -> mosaic -> write -> purge
//!
//! The stages run strictly one after another. Per-tile failures are contained
//! by the coordinator and reported; everything else aborts the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::app::client::download::temp_path_for;
use crate::app::client::DemClient;
use crate::app::coordinator::{CoordinatorConfig, ProgressTracker, RetryCoordinator};
use crate::app::geometry::AreaOfInterest;
use crate::app::models::{DownloadBatchResult, ProductType, Resolution, TileDescriptor, TileId};
use crate::app::raster::writer::{self, WriteOptions};
use crate::app::raster::{mosaic, preview, Raster};
use crate::app::resolver::{GridIndex, ManifestSource, TileResolver};
use crate::app::worker::{ArchiveTileFetcher, TileFetcher};
use crate::constants::{copernicus, files};
use crate::errors::{AppError, ConfigError, ConfigResult, Result};

/// Everything one pipeline run needs to know
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub output_file: String,
    pub resolution: Resolution,
    pub product: ProductType,
    /// Working directory for archives and extracted fragments
    pub work_dir: PathBuf,
    /// Copy extracted tiles next to the product before purging
    pub keep_tiles: bool,
    pub coordinator: CoordinatorConfig,
    pub write: WriteOptions,
    /// Render a PNG quick-look after writing
    pub plot: bool,
    pub manifest_base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            output_file: files::DEFAULT_OUTPUT_FILE.to_string(),
            resolution: Resolution::default(),
            product: ProductType::default(),
            work_dir: default_work_dir(),
            keep_tiles: false,
            coordinator: CoordinatorConfig::default(),
            write: WriteOptions::default(),
            plot: false,
            manifest_base_url: copernicus::MANIFEST_BASE_URL.to_string(),
        }
    }
}

/// `<system temp>/dem_fetcher`
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join(files::WORK_DIR_NAME)
}

impl PipelineConfig {
    /// Final product path
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file)
    }

    /// Extension of the raster member inside each archive
    pub fn member_extension(&self) -> &'static str {
        self.product.member_extension(self.resolution)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.coordinator.validate()?;

        let name = Path::new(&self.output_file);
        if self.output_file.trim().is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(ConfigError::invalid(
                "output.file",
                &self.output_file,
                "must be a plain file name",
            ));
        }

        if self.write.quantize && !(self.write.multiplier.is_finite() && self.write.multiplier > 0.0)
        {
            return Err(ConfigError::invalid(
                "product.multiplier",
                self.write.multiplier,
                "must be a positive number",
            ));
        }

        if self.work_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                "output.work_dir",
                "\"\"",
                "must not be empty",
            ));
        }

        if !(self.manifest_base_url.starts_with("http://")
            || self.manifest_base_url.starts_with("https://"))
        {
            return Err(ConfigError::invalid(
                "source.manifest_url",
                &self.manifest_base_url,
                "must be an http(s) URL",
            ));
        }

        Ok(())
    }
}

/// What happened during a run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Resolved tiles in id order
    pub descriptors: Vec<TileDescriptor>,
    /// Final per-tile status
    pub batch: DownloadBatchResult,
    pub output_path: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub kept_tiles: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn tile_count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn success_count(&self) -> usize {
        self.batch.success_count()
    }

    /// Descriptors of the permanently failed tiles
    pub fn failed(&self) -> Vec<&TileDescriptor> {
        let failed = self.batch.failed_ids();
        self.descriptors
            .iter()
            .filter(|d| failed.binary_search(&d.id).is_ok())
            .collect()
    }

    /// e.g. "11 of 12 tiles succeeded in 42.0s"
    pub fn summary_line(&self) -> String {
        format!(
            "{} of {} tiles succeeded in {:.1}s",
            self.success_count(),
            self.tile_count(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The product as written
    pub raster: Raster,
    pub report: PipelineReport,
}

/// Resolves, fetches, merges and writes the DEM for an area of interest
pub struct Pipeline {
    config: PipelineConfig,
    resolver: TileResolver,
    fetcher: Arc<dyn TileFetcher>,
    progress: Arc<ProgressTracker>,
}

impl Pipeline {
    /// Assemble a pipeline from its parts, validating the configuration
    pub fn new(
        config: PipelineConfig,
        resolver: TileResolver,
        fetcher: Arc<dyn TileFetcher>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            resolver,
            fetcher,
            progress: Arc::new(ProgressTracker::new()),
        })
    }

    /// Pipeline fetching over HTTP with `client`
    pub fn with_client(
        config: PipelineConfig,
        client: Arc<DemClient>,
        grid: Arc<dyn GridIndex>,
    ) -> ConfigResult<Self> {
        let source: Arc<dyn ManifestSource> = client.clone();
        let resolver = TileResolver::new(
            grid,
            source,
            config.manifest_base_url.clone(),
            config.resolution,
            config.product,
        );
        let fetcher = Arc::new(ArchiveTileFetcher::new(
            client,
            config.work_dir.clone(),
            config.member_extension(),
        ));
        Self::new(config, resolver, fetcher)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TileResolver {
        &self.resolver
    }

    /// Shared progress counters, for progress display while [`Pipeline::run`] is pending
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Run the whole pipeline for `aoi`
    ///
    /// # Errors
    ///
    /// Resolution, merge and write errors abort the run. Tiles that still
    /// fail after every retry pass do not; they are listed in the report.
    pub async fn run(&self, aoi: &AreaOfInterest) -> Result<PipelineOutput> {
        let started = Instant::now();

        let descriptors = self.resolver.resolve(aoi).await?;
        info!("Resolved {} tiles for the area of interest", descriptors.len());

        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| {
                AppError::generic(format!(
                    "Failed to create working directory {}: {}",
                    self.config.work_dir.display(),
                    e
                ))
            })?;

        let coordinator =
            RetryCoordinator::new(self.config.coordinator.clone(), Arc::clone(&self.fetcher))?
                .with_progress(Arc::clone(&self.progress));
        let batch = coordinator.run(&descriptors).await;

        info!(
            "{} of {} tiles succeeded in {:.1}s",
            batch.success_count(),
            descriptors.len(),
            started.elapsed().as_secs_f64()
        );
        let codes: HashMap<TileId, &str> = descriptors
            .iter()
            .map(|d| (d.id, d.grid_cell_code.as_str()))
            .collect();
        if !batch.is_complete() {
            let failed: Vec<String> = batch
                .failed_ids()
                .iter()
                .map(|id| format!("{} ({})", id, codes.get(id).copied().unwrap_or("?")))
                .collect();
            warn!(
                "{} tiles permanently failed and are missing from the mosaic: {}",
                failed.len(),
                failed.join(", ")
            );
        }

        let produced = self.assemble(aoi, &batch).await;

        let kept_tiles = if self.config.keep_tiles && produced.is_ok() {
            let fragments: Vec<(String, PathBuf)> = batch
                .outcomes
                .values()
                .filter_map(|o| {
                    let path = o.extracted_path.clone()?;
                    Some((codes.get(&o.id)?.to_string(), path))
                })
                .collect();
            writer::keep_tiles(&fragments, &self.config.output_dir)
        } else {
            Vec::new()
        };
        self.purge(&descriptors);

        let raster = produced?;
        let output_path = self.config.output_path();

        let preview_path = if self.config.plot {
            let path = preview::preview_path(&output_path);
            match preview::write_preview(&raster, &path) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            }
        } else {
            None
        };

        let report = PipelineReport {
            descriptors,
            batch,
            output_path,
            preview_path,
            kept_tiles,
            elapsed: started.elapsed(),
        };
        info!("{}", report.summary_line());
        Ok(PipelineOutput { raster, report })
    }

    /// Mosaic and write the product; raster work runs on the blocking pool
    async fn assemble(&self, aoi: &AreaOfInterest, batch: &DownloadBatchResult) -> Result<Raster> {
        let fragments = batch.fragments();
        let aoi = aoi.clone();
        let output_path = self.config.output_path();
        let options = self.config.write;
        debug!("Merging {} fragments", fragments.len());

        tokio::task::spawn_blocking(move || -> Result<Raster> {
            let raster = mosaic::build(&fragments, &aoi)?;
            writer::write(&raster, &output_path, options)?;
            Ok(raster)
        })
        .await
        .map_err(|e| AppError::generic(format!("raster task failed: {}", e)))?
    }

    /// Remove every working file this run may have created
    fn purge(&self, descriptors: &[TileDescriptor]) {
        let extension = self.config.member_extension();
        let work_dir = &self.config.work_dir;
        let paths: Vec<PathBuf> = descriptors
            .iter()
            .flat_map(|d| {
                let archive = d.archive_path(work_dir);
                let fragment = d.fragment_path(work_dir, extension);
                [
                    temp_path_for(&archive),
                    temp_path_for(&fragment),
                    archive,
                    fragment,
                ]
            })
            .collect();
        writer::purge(&paths, work_dir);
    }
}
