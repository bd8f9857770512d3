//! Command-line argument parsing for DEM Fetcher
//!
//! This module defines the CLI structure using clap derive macros. Every
//! flag of `fetch` and `tiles` overrides the matching configuration value.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::app::{ProductType, Resolution};
use crate::config::AppConfig;

/// DEM Fetcher - download and mosaic elevation tiles for an area of interest
#[derive(Parser, Debug)]
#[command(
    name = "dem_fetcher",
    version,
    about = "Download Copernicus DEM tiles covering an area of interest and merge them",
    long_about = "Resolves the elevation tiles intersecting a GeoJSON area of interest, downloads and
extracts them concurrently with retries, then writes one raster clipped to the area."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download, merge and clip the DEM for an area of interest
    Fetch(FetchArgs),

    /// List the tiles an area of interest needs without downloading
    Tiles(TilesArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Dataset selection shared by `fetch` and `tiles`
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Source resolution: 30m or 90m
    #[arg(short, long)]
    pub resolution: Option<Resolution>,

    /// Product type: DGED (GeoTIFF) or DTED
    #[arg(short, long)]
    pub product: Option<ProductType>,

    /// GeoJSON tile index to use instead of the one-degree grid
    #[arg(long, value_name = "GEOJSON")]
    pub grid: Option<PathBuf>,

    /// Feature property holding the cell code in the tile index
    #[arg(long, value_name = "NAME")]
    pub grid_property: Option<String>,

    /// Base URL of the manifest listings
    #[arg(long, value_name = "URL")]
    pub manifest_url: Option<String>,
}

impl SourceArgs {
    /// Override configuration values with the given flags
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(resolution) = self.resolution {
            config.source.resolution = resolution;
        }
        if let Some(product) = self.product {
            config.source.product = product;
        }
        if let Some(grid) = &self.grid {
            config.source.grid_index = Some(grid.clone());
        }
        if let Some(property) = &self.grid_property {
            config.source.grid_code_property = property.clone();
        }
        if let Some(url) = &self.manifest_url {
            config.source.manifest_url = url.clone();
        }
    }
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Area of interest (GeoJSON polygon or multipolygon, WGS84)
    #[arg(value_name = "AOI")]
    pub aoi: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output file name
    #[arg(short = 'f', long, value_name = "NAME")]
    pub output_file: Option<String>,

    /// Working directory for downloads
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Keep the individual tiles in <output-dir>/tiles
    #[arg(long)]
    pub keep_tiles: bool,

    /// Per-tile download timeout in seconds
    #[arg(short, long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Number of concurrent download workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Retry passes for failed tiles
    #[arg(long)]
    pub retries: Option<u32>,

    /// Write 16-bit integers scaled by the multiplier
    #[arg(long)]
    pub quantize: bool,

    /// Quantization multiplier
    #[arg(long, requires = "quantize")]
    pub multiplier: Option<f64>,

    /// Render a PNG preview after writing
    #[arg(long)]
    pub plot: bool,
}

impl FetchArgs {
    /// Override configuration values with the given flags
    pub fn apply(&self, config: &mut AppConfig) {
        self.source.apply(config);
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(file) = &self.output_file {
            config.output.file = file.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.output.work_dir = Some(dir.clone());
        }
        if let Some(secs) = self.timeout {
            config.download.timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = self.workers {
            config.download.workers = workers;
        }
        if let Some(retries) = self.retries {
            config.download.retries = retries;
        }
        if let Some(multiplier) = self.multiplier {
            config.product.multiplier = multiplier;
        }
        // Switches only ever turn features on
        config.output.keep_tiles |= self.keep_tiles;
        config.product.quantize |= self.quantize;
        config.product.plot |= self.plot;
    }
}

/// Arguments for the tiles command
#[derive(Args, Debug, Clone, Default)]
pub struct TilesArgs {
    /// Area of interest (GeoJSON polygon or multipolygon, WGS84)
    #[arg(value_name = "AOI")]
    pub aoi: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Destination (default: user config directory)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        self.log_level_or(tracing::Level::WARN)
    }

    /// Logging level from the flags, `default` when none is given
    pub fn log_level_or(&self, default: tracing::Level) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            default
        }
    }
}
