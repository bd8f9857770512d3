//! Application constants for DEM Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Overrides the manifest base URL (useful for mirrors)
    pub const MANIFEST_URL: &str = "DEM_FETCHER_MANIFEST_URL";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "DEM-Fetcher/0.1.0 (Elevation Tile Downloader)";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;

    /// Timeout for manifest retrieval
    pub const MANIFEST_TIMEOUT: Duration = Duration::from_secs(120);
}

/// Rate limiting configuration
pub mod limits {
    /// Default request rate toward the tile host (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;
}

/// Copernicus DEM service endpoints and naming
pub mod copernicus {
    /// Base URL of the public manifest listings, one listing per dataset
    pub const MANIFEST_BASE_URL: &str =
        "https://prism-dem-open.copernicus.eu/pd-desk-open-access/publicDemURLs";

    /// Dataset release suffix appended to every listing name
    pub const DATASET_RELEASE: &str = "2023_1";

    /// Archive name prefix shared by every tile
    pub const ARCHIVE_PREFIX: &str = "Copernicus_DSM";

    /// Archive file extension
    pub const ARCHIVE_EXTENSION: &str = ".tar";

    /// Directory inside each archive holding the elevation raster
    pub const RASTER_MEMBER_DIR: &str = "DEM";

    /// Default GeoJSON property carrying the cell code in feature grids
    pub const GRID_CODE_PROPERTY: &str = "GeoCellID";
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Default output raster name
    pub const DEFAULT_OUTPUT_FILE: &str = "dem.tif";

    /// Directory (under the output directory) for retained tiles
    pub const KEPT_TILES_DIR: &str = "tiles";

    /// Name of the working directory created under the temp root
    pub const WORK_DIR_NAME: &str = "dem_fetcher";

    /// Suffix of the quick-look preview image
    pub const PREVIEW_SUFFIX: &str = "_preview.png";
}

/// Worker and retry configuration
pub mod workers {
    use super::Duration;

    /// Default number of concurrent fetch workers
    pub const DEFAULT_WORKER_COUNT: usize = 4;

    /// Maximum recommended concurrent workers
    pub const MAX_WORKER_COUNT: usize = 64;

    /// Default number of retry passes after the initial pass
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Default per-tile download timeout
    pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
}

/// Raster encoding constants
pub mod raster {
    /// No-data marker for floating point rasters
    pub const FLOAT_NODATA: f32 = -32767.0;

    /// No-data marker for quantized 16-bit output
    pub const INT_NODATA: i16 = i16::MIN;

    /// Default quantization multiplier
    pub const DEFAULT_MULTIPLIER: f64 = 1.0;

    /// GeoTIFF ModelPixelScale tag
    pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;

    /// GeoTIFF ModelTiepoint tag
    pub const TAG_MODEL_TIEPOINT: u16 = 33922;

    /// GeoTIFF GeoKeyDirectory tag
    pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

    /// GDAL no-data tag (ASCII)
    pub const TAG_GDAL_NODATA: u16 = 42113;

    /// EPSG code of geographic WGS84
    pub const EPSG_WGS84: u16 = 4326;
}

/// Progress reporting
pub mod progress {
    use super::Duration;

    /// Spinner / bar redraw interval
    pub const TICK_INTERVAL: Duration = Duration::from_millis(120);

    /// Interval between text-mode progress lines
    pub const TEXT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
}

pub use workers::{DEFAULT_MAX_RETRIES, DEFAULT_WORKER_COUNT};
