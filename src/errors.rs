//! Error types for DEM Fetcher
//!
//! Each pipeline stage has its own error enum. Per-tile failures
//! ([`FetchError`]) never reach the caller; they are folded into a
//! [`crate::app::models::TileStatus`] by the fetch unit and retried by the
//! coordinator. Only systemic failures propagate as [`AppError`].

use std::path::PathBuf;
use thiserror::Error;

/// Tile resolution errors, all fatal and raised before any download starts
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// The area of interest touches no cell of the tile index
    #[error("Area of interest does not intersect any grid cell")]
    NoIntersectingCells,

    /// Intersecting cells exist but none has a downloadable archive
    #[error("None of the {cells} intersecting grid cells has a matching archive in the manifest")]
    NoMatchingTiles { cells: usize },

    /// Manifest could not be retrieved
    #[error("Failed to retrieve tile manifest from {url}: {reason}")]
    ManifestUnavailable { url: String, reason: String },

    /// Manifest body contained no recognizable archive entries
    #[error("Tile manifest from {url} could not be parsed: {reason}")]
    ManifestUnparseable { url: String, reason: String },

    /// Area of interest or grid index could not be read
    #[error("Invalid geometry in {source_name}: {reason}")]
    InvalidGeometry { source_name: String, reason: String },

    /// I/O error reading a geometry file
    #[error("I/O error reading geometry")]
    Io(#[from] std::io::Error),

    /// JSON error reading a geometry file
    #[error("GeoJSON parsing error")]
    Json(#[from] serde_json::Error),
}

impl ResolutionError {
    /// Shorthand for an invalid geometry error
    pub fn invalid_geometry(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Cause of a single failed tile fetch attempt
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Download exceeded its time budget
    #[error("Download timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Invalid URL
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// The expected raster member is absent from the archive
    #[error("Archive {archive} has no member {member}")]
    MissingMember { archive: PathBuf, member: String },

    /// Archive could not be read or written out
    #[error("Archive extraction failed for {archive}: {reason}")]
    Extraction { archive: PathBuf, reason: String },

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Atomic rename of a finished download failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },
}

/// Raster decoding and sampling errors
#[derive(Error, Debug)]
pub enum RasterError {
    /// TIFF codec error
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// I/O error
    #[error("Raster I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is missing the geo-referencing tags
    #[error("Raster {path} is not geo-referenced")]
    MissingGeoreference { path: PathBuf },

    /// Unsupported file format
    #[error("Unsupported raster format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Corrupt or truncated DTED file
    #[error("Malformed DTED file {path}: {reason}")]
    MalformedDted { path: PathBuf, reason: String },

    /// Raster dimensions and data length disagree
    #[error("Raster dimensions {width}x{height} do not match {len} cells")]
    DimensionMismatch { width: usize, height: usize, len: usize },
}

/// Mosaic errors
#[derive(Error, Debug)]
pub enum MergeError {
    /// Every tile permanently failed
    #[error("No raster fragments available to merge; every tile failed")]
    NoFragments,

    /// A fragment could not be read
    #[error("Failed to read fragment {path}: {source}")]
    Fragment {
        path: PathBuf,
        #[source]
        source: RasterError,
    },

    /// The area of interest lies outside the merged coverage
    #[error("Area of interest does not overlap the merged raster")]
    EmptyIntersection,
}

/// Final product serialization errors
#[derive(Error, Debug)]
pub enum WriteError {
    /// TIFF encoding failed
    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    /// Output file could not be created
    #[error("Failed to create output file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Quick-look rendering failed
    #[error("Failed to render preview {path}: {reason}")]
    Preview { path: PathBuf, reason: String },

    /// Quantization multiplier is not usable
    #[error("Invalid quantization multiplier: {multiplier}")]
    InvalidMultiplier { multiplier: f64 },

    /// Scaled values do not fit the 16-bit output
    #[error(
        "{count} cells exceed the int16 range at multiplier {multiplier} (extreme value {max_value})"
    )]
    QuantizeOverflow {
        count: usize,
        max_value: f32,
        multiplier: f64,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration file could not be read or written
    #[error("Configuration I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Shorthand for an invalid value error
    pub fn invalid(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    /// Tile resolution error
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Mosaic error
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Output error
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Raster error outside of merging
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP client construction error
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if re-running the command could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Resolution(ResolutionError::ManifestUnavailable { .. })
                | AppError::Merge(MergeError::NoFragments)
                | AppError::Client(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Resolution(_) => "resolution",
            AppError::Merge(_) => "merge",
            AppError::Write(_) => "write",
            AppError::Raster(_) => "raster",
            AppError::Config(_) => "config",
            AppError::Client(_) => "client",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Resolution result type alias
pub type ResolutionResult<T> = std::result::Result<T, ResolutionError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Raster result type alias
pub type RasterResult<T> = std::result::Result<T, RasterError>;

/// Merge result type alias
pub type MergeResult<T> = std::result::Result<T, MergeError>;

/// Write result type alias
pub type WriteResult<T> = std::result::Result<T, WriteError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
