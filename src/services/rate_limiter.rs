//! Rate limiting and retry logic for external API calls
//!
//! Provides rate-limited HTTP clients and retry utilities to prevent
//! overwhelming the metadata services and handle transient failures.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Response};
use tracing::{debug, warn};

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 5,
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    pub fn new(name: &str, config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!(client = %name, error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name: name.to_string(),
        }
    }

    /// TVMaze allows ~20 requests per 10 seconds
    pub fn for_tvmaze() -> Self {
        Self::new(
            "tvmaze",
            RateLimitConfig {
                requests_per_second: 2,
                burst_size: 5,
            },
        )
    }

    /// TMDB allows ~40 requests per 10 seconds
    pub fn for_tmdb() -> Self {
        Self::new(
            "tmdb",
            RateLimitConfig {
                requests_per_second: 4,
                burst_size: 10,
            },
        )
    }

    /// Wait for rate limit and make a GET request with query parameters
    pub async fn get_with_query<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &T,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request");

        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .context("HTTP request failed")
    }

    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            current_interval: self.initial_interval,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        }
    }
}

/// A response retrying cannot fix: bad credentials or a non-transient 4xx
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PermanentError(pub String);

/// Everything except a [`PermanentError`] is worth another attempt
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<PermanentError>().is_none()
}

/// Execute an async operation with retry logic.
/// Errors for which `should_retry` is false are returned immediately.
pub async fn retry_async<T, E, Fut, F, R>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
    should_retry: R,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    debug!(operation = %operation_name, error = %e, "Not retrying permanent failure");
                    return Err(e);
                }
                if attempts >= config.max_retries {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            operation = %operation_name,
                            attempt = attempts,
                            error = %e,
                            retry_in_ms = duration.as_millis() as u64,
                            "Operation failed, retrying"
                        );
                        tokio::time::sleep(duration).await;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}

pub trait ResponseExt {
    /// Transient errors worth retrying: 408, 429 and 5xx
    fn is_transient_error(&self) -> bool;
}

impl ResponseExt for Response {
    fn is_transient_error(&self) -> bool {
        let status = self.status().as_u16();
        status == 429 || status == 408 || (500..600).contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_second, 2);
        assert_eq!(config.burst_size, 5);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_async(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err(format!("attempt {}", n)) } else { Ok(n) } }
            },
            &fast_retry(),
            "test",
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_async(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("always".to_string()) }
            },
            &fast_retry(),
            "test",
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), anyhow::Error> = retry_async(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PermanentError("invalid api key".to_string()).into()) }
            },
            &fast_retry(),
            "test",
            is_retryable,
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "invalid api key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_retry_waits_initial_interval() {
        let config = RetryConfig {
            initial_interval: Duration::from_millis(40),
            max_interval: Duration::from_secs(1),
            ..fast_retry()
        };
        let first = config.to_backoff().next_backoff().unwrap();
        // default randomization factor is 0.5
        assert!(first >= Duration::from_millis(20), "{:?}", first);
        assert!(first <= Duration::from_millis(60), "{:?}", first);
    }

    #[tokio::test]
    async fn test_zero_rate_is_clamped() {
        let client = RateLimitedClient::new(
            "test",
            RateLimitConfig {
                requests_per_second: 0,
                burst_size: 0,
            },
        );
        // a single permit is always available immediately
        client.wait_for_permit().await;
    }
}
