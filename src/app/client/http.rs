//! Core HTTP operations with rate limiting
//!
//! Every request toward the tile host passes through one shared `governor`
//! limiter, so the number of concurrent workers never translates into a burst
//! of connections.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::Client;
use url::Url;

use crate::errors::{ConfigError, ConfigResult, FetchError, FetchResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limit
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the rate limit is zero
    pub fn new(client: Client, rate_limit_rps: u32) -> ConfigResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> ConfigResult<DirectRateLimiter> {
        let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            ConfigError::invalid("client.rate_limit_rps", rate_limit_rps, "must be non-zero")
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    /// Sends a GET request and checks the status
    ///
    /// Non-2xx answers become [`FetchError::Status`]. Retrying is left to
    /// the caller.
    pub async fn get_response(&self, url: &Url) -> FetchResult<reqwest::Response> {
        // Jitter avoids a thundering herd when a pass starts
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!("GET {} answered {}", url, status);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        tracing::debug!("Successfully fetched response: {}", url);
        Ok(response)
    }

    /// Fetches a text document
    pub async fn get_text(&self, url: &Url) -> FetchResult<String> {
        let response = self.get_response(url).await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::config::ClientConfig;

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let rate_limiter = HttpHandler::build_rate_limiter(5).unwrap();
        rate_limiter.until_ready().await;
    }

    #[test]
    fn test_rate_limiter_zero_fails() {
        assert!(HttpHandler::build_rate_limiter(0).is_err());
    }

    #[tokio::test]
    async fn test_http_handler_creation() {
        let client = ClientConfig::default().build_http_client().unwrap();
        assert!(HttpHandler::new(client, 5).is_ok());
    }
}
