//! Configuration for the retry coordinator

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{ConfigError, ConfigResult};

/// Worker count, retry budget and per-tile timeout for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Number of concurrent fetch workers; 1 runs strictly sequentially
    pub worker_count: usize,
    /// Retry passes after the initial pass
    pub max_retries: u32,
    /// Budget for a single archive download
    #[serde(with = "humantime_serde")]
    pub download_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_retries: workers::DEFAULT_MAX_RETRIES,
            download_timeout: workers::DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Maximum number of passes, the initial one included
    pub fn max_passes(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::invalid(
                "download.workers",
                self.worker_count,
                "must be at least 1",
            ));
        }

        if self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(ConfigError::invalid(
                "download.workers",
                self.worker_count,
                format!("exceeds maximum ({})", workers::MAX_WORKER_COUNT),
            ));
        }

        if self.download_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "download.timeout",
                format!("{:?}", self.download_timeout),
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_count, workers::DEFAULT_WORKER_COUNT);
        assert_eq!(config.max_passes(), workers::DEFAULT_MAX_RETRIES + 1);
    }

    #[test]
    fn test_config_builder_methods() {
        let config = CoordinatorConfig::default()
            .with_worker_count(1)
            .with_max_retries(0)
            .with_download_timeout(Duration::from_secs(5));

        assert_eq!(config.worker_count, 1);
        assert_eq!(config.max_passes(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(CoordinatorConfig::default()
            .with_worker_count(0)
            .validate()
            .is_err());
        assert!(CoordinatorConfig::default()
            .with_worker_count(workers::MAX_WORKER_COUNT + 1)
            .validate()
            .is_err());
        assert!(CoordinatorConfig::default()
            .with_download_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
