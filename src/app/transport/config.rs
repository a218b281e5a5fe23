//! HTTP client configuration and building logic
//!
//! One `reqwest::Client` is built per process and shared by every extraction
//! attempt. It never follows redirects and never stores cookies: both are
//! handled per attempt above the client.

use std::time::Duration;

use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};

use crate::constants::{http, limits};
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the shared HTTP client and the transport above it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Enable HTTP/2 adaptive window
    pub http2: bool,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Whole-request timeout of the client
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Rate limit of the shared exchange (requests per second)
    pub rate_limit_rps: u32,
    /// Redirect hops chased before giving up
    pub max_redirects: usize,
    /// Retries of a single exchange after a transient fault
    pub max_retries: u32,
    /// Base delay of the exponential retry backoff
    pub retry_base_delay: Duration,
    /// Upper bound of random jitter added to each backoff
    pub retry_jitter: Duration,
    /// Default user agent of the client
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            http2: false,
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_redirects: http::MAX_REDIRECTS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            retry_jitter: Duration::from_millis(limits::RETRY_JITTER_MS),
            user_agent: http::USER_AGENT.to_string(),
        }
    }
}

impl TransportConfig {
    /// Builds the shared HTTP client with the specified configuration
    pub fn build_http_client(&self) -> ConfigResult<Client> {
        let mut client_builder = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str())
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if self.http2 {
            client_builder = client_builder.http2_adaptive_window(true);
        }

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(ConfigError::ClientBuild)
    }

    /// Check values that would make the transport unusable
    pub fn validate(&self) -> ConfigResult<()> {
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transport.rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "Rate limit must be non-zero".to_string(),
            });
        }
        if self.max_redirects == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transport.max_redirects".to_string(),
                value: "0".to_string(),
                reason: "At least one redirect hop is required".to_string(),
            });
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.retry_base_delay.saturating_mul(2_u32.saturating_pow(attempt));
        let jitter_ms = self.retry_jitter.as_millis() as u64;
        exponential.saturating_add(Duration::from_millis(fastrand::u64(0..=jitter_ms)))
    }
}
