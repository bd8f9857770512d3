//! HTTP client configuration and building logic
//!
//! Tile archives are large and served from a single host, so the client keeps
//! a small pool of long-lived connections and a modest request rate.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{http, limits};
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the tile host HTTP client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TCP keep-alive interval
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for manifest requests; archive downloads use the per-tile budget
    #[serde(with = "humantime_serde")]
    pub manifest_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            connect_timeout: http::CONNECT_TIMEOUT,
            manifest_timeout: http::MANIFEST_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::invalid(
                "client.rate_limit_rps",
                self.rate_limit_rps,
                "must be at least 1",
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "client.connect_timeout",
                format!("{:?}", self.connect_timeout),
                "must be greater than zero",
            ));
        }
        if self.manifest_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "client.manifest_timeout",
                format!("{:?}", self.manifest_timeout),
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Builds the HTTP client with the specified configuration
    ///
    /// No global request timeout is set; each download carries its own budget.
    pub fn build_http_client(&self) -> reqwest::Result<Client> {
        let mut client_builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build()
    }
}
