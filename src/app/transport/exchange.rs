//! Single HTTP exchange
//!
//! `HttpExchange` is the seam between the crate and the network: one request
//! out, one response back, redirects never followed. `ReqwestExchange` is the
//! default implementation over a shared, rate-limited `reqwest::Client`;
//! tests and callers with their own client plug in other implementations.

use std::error::Error as StdError;
use std::fmt;
use std::io::ErrorKind;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, LOCATION, SET_COOKIE};
use reqwest::Client;
use url::Url;

use super::config::TransportConfig;
use super::headers::HeaderSet;
use crate::constants::{http, limits};
use crate::errors::{ConfigError, ConfigResult, TransportError, TransportResult};

/// Request methods the extraction core issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
        })
    }
}

/// One outgoing request
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderSet,
    pub body: Option<String>,
}

impl ExchangeRequest {
    pub fn get(url: Url, headers: HeaderSet) -> Self {
        Self {
            method: Method::Get,
            url,
            headers,
            body: None,
        }
    }

    pub fn head(url: Url, headers: HeaderSet) -> Self {
        Self {
            method: Method::Head,
            url,
            headers,
            body: None,
        }
    }

    pub fn post(url: Url, headers: HeaderSet, body: String) -> Self {
        Self {
            method: Method::Post,
            url,
            headers,
            body: Some(body),
        }
    }

    /// Request re-issued against a redirect target
    ///
    /// A POST becomes a bodiless GET on every redirect except 307/308.
    pub fn redirected(&self, target: Url, status: u16) -> Self {
        let keeps_method = matches!(status, 307 | 308) || self.method != Method::Post;
        if keeps_method {
            Self {
                url: target,
                ..self.clone()
            }
        } else {
            Self {
                method: Method::Get,
                url: target,
                headers: self.headers.without("Content-Type"),
                body: None,
            }
        }
    }
}

/// Response of a single exchange, body fully read
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// URL this response was received from
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, url: Url) -> Self {
        Self {
            status,
            url,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    /// Add a header; names or values that are not valid HTTP are skipped
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Redirect status carrying a `Location`
    pub fn is_redirect(&self) -> bool {
        http::REDIRECT_STATUSES.contains(&self.status) && self.headers.contains_key(LOCATION)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Declared `Content-Length`
    ///
    /// Read from the header rather than the body so HEAD responses report it.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn set_cookies(&self) -> impl Iterator<Item = &HeaderValue> {
        self.headers.get_all(SET_COOKIE).iter()
    }

    /// Body shortened for log output
    pub fn body_excerpt(&self) -> &str {
        match self.body.char_indices().nth(http::LOG_BODY_EXCERPT) {
            Some((end, _)) => &self.body[..end],
            None => &self.body,
        }
    }
}

/// Performs one HTTP exchange without following redirects
#[async_trait]
pub trait HttpExchange: Send + Sync {
    async fn exchange(&self, request: ExchangeRequest) -> TransportResult<RawResponse>;
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default exchange over a shared `reqwest::Client`
pub struct ReqwestExchange {
    client: Client,
    rate_limiter: DirectRateLimiter,
}

impl fmt::Debug for ReqwestExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestExchange").finish_non_exhaustive()
    }
}

impl ReqwestExchange {
    /// Creates a new exchange with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `rate_limit_rps` is zero
    pub fn new(client: Client, rate_limit_rps: u32) -> ConfigResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Builds the client described by `config` and wraps it
    pub fn from_config(config: &TransportConfig) -> ConfigResult<Self> {
        config.validate()?;
        Self::new(config.build_http_client()?, config.rate_limit_rps)
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> ConfigResult<DirectRateLimiter> {
        let rate = NonZeroU32::new(rate_limit_rps).ok_or_else(|| ConfigError::InvalidValue {
            field: "rate_limit_rps".to_string(),
            value: rate_limit_rps.to_string(),
            reason: "Rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rate)))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn exchange(&self, request: ExchangeRequest) -> TransportResult<RawResponse> {
        // Spread bursts from concurrent attempts
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(limits::RETRY_JITTER_MS)))
            .await;

        let builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Head => self.client.head(request.url.clone()),
            Method::Post => self.client.post(request.url.clone()),
        };
        let mut builder = builder.headers(request.headers.to_header_map()?);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!("{} {}", request.method, request.url);
        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&request.url, e))?;

        let status = response.status().as_u16();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = if request.method == Method::Head {
            String::new()
        } else {
            response
                .text()
                .await
                .map_err(|e| classify_error(&request.url, e))?
        };

        Ok(RawResponse {
            status,
            url,
            headers,
            body,
        })
    }
}

/// Sort a client failure into "retry advisable" or a hard HTTP error
fn classify_error(url: &Url, error: reqwest::Error) -> TransportError {
    if error.is_timeout() || error.is_connect() || is_connection_fault(&error) {
        TransportError::Transient {
            url: url.to_string(),
            reason: error.to_string(),
        }
    } else {
        TransportError::Http(error)
    }
}

fn is_connection_fault(error: &(dyn StdError + 'static)) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::TimedOut
                    | ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
