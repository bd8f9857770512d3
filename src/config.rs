//! Configuration management for DEM Fetcher
//!
//! Settings are layered: built-in defaults, then a TOML config file, then
//! environment variables, then command-line flags (applied by the CLI).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::raster::writer::WriteOptions;
use crate::app::{ClientConfig, CoordinatorConfig, PipelineConfig, ProductType, Resolution};
use crate::app::pipeline::default_work_dir;
use crate::constants::{copernicus, env, files, limits, raster, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = "dem-fetcher.toml";

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Where the product and retained tiles go
    pub output: OutputConfig,
    /// Dataset selection and remote index
    pub source: SourceConfig,
    /// Worker pool and retry settings
    pub download: DownloadConfig,
    /// HTTP client settings
    pub client: ClientConfig,
    /// Product encoding settings
    pub product: ProductConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory
    pub dir: PathBuf,
    /// Output file name inside `dir`
    pub file: String,
    /// Working directory for downloads (None = system temp)
    pub work_dir: Option<PathBuf>,
    /// Copy extracted tiles to `<dir>/tiles/`
    pub keep_tiles: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file: files::DEFAULT_OUTPUT_FILE.to_string(),
            work_dir: None,
            keep_tiles: false,
        }
    }
}

/// Dataset selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub resolution: Resolution,
    pub product: ProductType,
    /// Base URL of the manifest listings
    pub manifest_url: String,
    /// GeoJSON tile index; the regular one-degree grid is used when unset
    pub grid_index: Option<PathBuf>,
    /// Feature property holding the cell code in `grid_index`
    pub grid_code_property: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            product: ProductType::default(),
            manifest_url: copernicus::MANIFEST_BASE_URL.to_string(),
            grid_index: None,
            grid_code_property: copernicus::GRID_CODE_PROPERTY.to_string(),
        }
    }
}

/// Download settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Retry passes after the initial pass
    pub retries: u32,
    /// Per-tile download timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: workers::DEFAULT_WORKER_COUNT,
            retries: workers::DEFAULT_MAX_RETRIES,
            timeout: workers::DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

/// Product encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    /// Write 16-bit integers scaled by `multiplier` instead of floats
    pub quantize: bool,
    pub multiplier: f64,
    /// Render a PNG preview next to the product
    pub plot: bool,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            quantize: false,
            multiplier: raster::DEFAULT_MULTIPLIER,
            plot: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> ConfigResult<tracing::Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid(
                "logging.level",
                &self.level,
                "expected error, warn, info, debug or trace",
            )
        })
    }
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (if exists)
    /// 3. Environment variables
    ///
    /// CLI arguments are applied on top by the caller.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Self::load_from_file(&path).await?
            }
            None => match Self::find_config_file() {
                Some(path) => Self::load_from_file(&path).await?,
                None => {
                    debug!("No config file found in standard locations");
                    Self::default()
                }
            },
        };

        config.apply_manifest_override(std::env::var(env::MANIFEST_URL).ok());
        Ok(config)
    }

    /// Override the manifest base URL, ignoring empty values
    pub fn apply_manifest_override(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            debug!("Manifest base URL overridden by {}", env::MANIFEST_URL);
            self.source.manifest_url = url.trim().to_string();
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(".").join(LOCAL_CONFIG_FILE)];
        if let Ok(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ConfigError::invalid("config_dir", "none", "could not determine user config directory")
        })?;

        Ok(config_dir.join("dem-fetcher").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Write a commented default configuration file
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub async fn init(path: &Path, force: bool) -> ConfigResult<()> {
        if path.exists() && !force {
            return Err(ConfigError::invalid(
                "path",
                path.display(),
                "file already exists (use --force to overwrite)",
            ));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.logging.level()?;
        self.client.validate()?;
        self.pipeline_config().validate()
    }

    /// Runtime configuration of the pipeline
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            output_dir: self.output.dir.clone(),
            output_file: self.output.file.clone(),
            resolution: self.source.resolution,
            product: self.source.product,
            work_dir: self.output.work_dir.clone().unwrap_or_else(default_work_dir),
            keep_tiles: self.output.keep_tiles,
            coordinator: CoordinatorConfig {
                worker_count: self.download.workers,
                max_retries: self.download.retries,
                download_timeout: self.download.timeout,
            },
            write: WriteOptions {
                quantize: self.product.quantize,
                multiplier: self.product.multiplier,
            },
            plot: self.product.plot,
            manifest_base_url: self.source.manifest_url.clone(),
        }
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# DEM Fetcher Configuration
# Every setting can also be given on the command line.

[output]
# Directory and file name of the merged product
dir = "."
file = "{output_file}"

# Working directory for archives and extracted tiles (default: system temp)
# work_dir = "/tmp/dem_fetcher"

# Copy extracted tiles to <dir>/tiles/ before cleanup
keep_tiles = false

[source]
# 30m or 90m
resolution = "30m"
# DGED (GeoTIFF) or DTED
product = "DGED"
# Base URL of the manifest listings (env: {manifest_env})
manifest_url = "{manifest_url}"
# GeoJSON tile index instead of the regular one-degree grid
# grid_index = "/path/to/grid.geojson"
grid_code_property = "{code_property}"

[download]
workers = {workers}
retries = {retries}
timeout = "{timeout}s"

[client]
tcp_keepalive = "30s"
tcp_nodelay = true
pool_idle_timeout = "90s"
pool_max_per_host = 16
connect_timeout = "30s"
manifest_timeout = "120s"
rate_limit_rps = {rps}

[product]
# Store round(elevation * multiplier) as 16-bit integers
quantize = false
multiplier = {multiplier:.1}
# Render <file stem>_preview.png after writing
plot = false

[logging]
level = "warn"  # error, warn, info, debug, trace
"#,
            output_file = files::DEFAULT_OUTPUT_FILE,
            manifest_env = env::MANIFEST_URL,
            manifest_url = copernicus::MANIFEST_BASE_URL,
            code_property = copernicus::GRID_CODE_PROPERTY,
            workers = workers::DEFAULT_WORKER_COUNT,
            retries = workers::DEFAULT_MAX_RETRIES,
            timeout = workers::DEFAULT_DOWNLOAD_TIMEOUT.as_secs(),
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            multiplier = raster::DEFAULT_MULTIPLIER,
        )
    }
}
