//! Per-attempt HTTP session
//!
//! A `Session` belongs to exactly one extraction attempt. It owns that
//! attempt's base headers (user agent, caller cookies), an attempt-local
//! cookie jar and a cancellation token, and wraps the shared transport with a
//! fixed per-phase timeout that callers cannot configure away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::app::models::Cookie;
use crate::app::platform::{Platform, PlatformPolicy};
use crate::app::transport::{
    ExchangeRequest, Fetched, HeaderSet, HttpExchange, ProbedSize, RawResponse, RedirectPolicy,
    Transport,
};
use crate::app::util::sanitize_header_value;
use crate::constants::session;
use crate::errors::{TransportError, TransportResult};

/// Session policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound of every network phase (fetch, probe, availability check)
    pub phase_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            phase_timeout: session::PHASE_TIMEOUT,
        }
    }
}

/// Exchange decorator keeping an attempt-local cookie jar
///
/// Cookies the jar holds for a request URL are appended to the request's
/// `Cookie` header; `Set-Cookie` headers of every response, redirect hops
/// included, are stored back.
pub struct CookieTrackingExchange {
    inner: Arc<dyn HttpExchange>,
    jar: Jar,
    observed: Mutex<Vec<Cookie>>,
}

impl CookieTrackingExchange {
    pub fn new(inner: Arc<dyn HttpExchange>) -> Self {
        Self {
            inner,
            jar: Jar::default(),
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Cookies received so far, latest value per name and domain
    pub async fn observed(&self) -> Vec<Cookie> {
        self.observed.lock().await.clone()
    }

    async fn record(&self, response: &RawResponse) {
        let headers: Vec<&HeaderValue> = response.set_cookies().collect();
        if headers.is_empty() {
            return;
        }
        self.jar.set_cookies(&mut headers.iter().copied(), &response.url);

        let domain = response.url.host_str().unwrap_or_default();
        let mut observed = self.observed.lock().await;
        for header in headers {
            let Some(cookie) = header
                .to_str()
                .ok()
                .and_then(|h| Cookie::parse_set_cookie(h, domain))
            else {
                continue;
            };
            match observed
                .iter_mut()
                .find(|c| c.name == cookie.name && c.domain == cookie.domain)
            {
                Some(existing) => *existing = cookie,
                None => observed.push(cookie),
            }
        }
    }
}

#[async_trait]
impl HttpExchange for CookieTrackingExchange {
    async fn exchange(&self, mut request: ExchangeRequest) -> TransportResult<RawResponse> {
        if let Some(stored) = self.jar.cookies(&request.url) {
            if let Ok(stored) = stored.to_str() {
                let merged = match request.headers.get(session::COOKIE_HEADER) {
                    Some(existing) if !existing.is_empty() => merge_cookie_header(existing, stored),
                    _ => stored.to_string(),
                };
                request.headers = request.headers.with(session::COOKIE_HEADER, merged);
            }
        }

        let response = self.inner.exchange(request).await?;
        self.record(&response).await;
        Ok(response)
    }
}

/// Join caller cookies with jar cookies; a jar cookie replaces a caller
/// cookie of the same name
fn merge_cookie_header(caller: &str, stored: &str) -> String {
    let name_of = |pair: &str| pair.split('=').next().unwrap_or_default().trim().to_string();
    let stored_names: Vec<String> = stored.split(';').map(name_of).collect();

    caller
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty() && !stored_names.contains(&name_of(pair)))
        .chain(stored.split(';').map(str::trim).filter(|pair| !pair.is_empty()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// HTTP session of one extraction attempt
pub struct Session {
    transport: Transport,
    cookies: Arc<CookieTrackingExchange>,
    platform: Option<Platform>,
    input_url: String,
    credentials: Option<String>,
    headers: HeaderSet,
    phase_timeout: Duration,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("platform", &self.platform)
            .field("input_url", &self.input_url)
            .field("has_credentials", &self.credentials.is_some())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session over `transport`
    ///
    /// `credentials` is the caller's raw cookie string; it is sanitized and
    /// sent as the `Cookie` header. The session's token is a child of
    /// `parent`, so closing the session never cancels the caller's token.
    pub fn new(
        transport: &Transport,
        platform: Option<Platform>,
        input_url: impl Into<String>,
        credentials: Option<&str>,
        config: &SessionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let cookies = Arc::new(CookieTrackingExchange::new(transport.exchange()));
        let transport = transport.with_exchange(cookies.clone());

        let credentials = credentials
            .map(sanitize_header_value)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let user_agent = platform
            .and_then(|p| p.policy().user_agent)
            .map(str::to_string)
            .unwrap_or_else(|| transport.config().user_agent.clone());
        let mut headers = HeaderSet::new().with(session::USER_AGENT_HEADER, user_agent);
        if let Some(cookie) = &credentials {
            headers = headers.with(session::COOKIE_HEADER, cookie.as_str());
        }

        Self {
            transport,
            cookies,
            platform,
            input_url: input_url.into(),
            credentials,
            headers,
            phase_timeout: config.phase_timeout,
            cancel: parent.child_token(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn policy(&self) -> PlatformPolicy {
        self.platform
            .map(|p| p.policy())
            .unwrap_or_default()
    }

    pub fn input_url(&self) -> &str {
        &self.input_url
    }

    /// Replace the input URL (platform normalization)
    pub fn set_input_url(&mut self, url: impl Into<String>) {
        self.input_url = url.into();
    }

    /// Sanitized caller cookies
    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Base headers every request of this attempt starts from
    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Set a base header for every later request
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers = self.headers.with(name, value);
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cookies the platform set during this attempt
    pub async fn observed_cookies(&self) -> Vec<Cookie> {
        self.cookies.observed().await
    }

    /// GET with the base headers, following redirects
    pub async fn get(&self, url: &str) -> TransportResult<Fetched> {
        self.fetch(url, &self.headers, RedirectPolicy::Follow).await
    }

    pub async fn fetch(
        &self,
        url: &str,
        headers: &HeaderSet,
        policy: RedirectPolicy,
    ) -> TransportResult<Fetched> {
        self.guarded(self.transport.fetch(url, headers, policy)).await
    }

    pub async fn fetch_raw(
        &self,
        url: &str,
        headers: &HeaderSet,
        policy: RedirectPolicy,
    ) -> TransportResult<RawResponse> {
        self.guarded(self.transport.fetch_raw(url, headers, policy))
            .await
    }

    pub async fn post_json(
        &self,
        url: &str,
        headers: &HeaderSet,
        body: &serde_json::Value,
    ) -> TransportResult<Fetched> {
        self.guarded(self.transport.post_json(url, headers, body))
            .await
    }

    /// Size probe with the base headers; timeouts and cancellation read as unknown
    pub async fn probe_size(&self, url: &str) -> ProbedSize {
        match self
            .guarded(async { Ok(self.transport.probe_size(url, &self.headers).await) })
            .await
        {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!("Size probe of {} abandoned: {}", url, e);
                ProbedSize::Unknown
            }
        }
    }

    pub async fn check_availability(&self, url: &str) -> TransportResult<bool> {
        self.guarded(self.transport.check_availability(url, &self.headers))
            .await
    }

    /// Release the session; in-flight and later calls fail with `SessionClosed`
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closing session for {}", self.input_url);
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run one network phase under the timeout and cancellation guard
    async fn guarded<T, F>(&self, phase: F) -> TransportResult<T>
    where
        F: std::future::Future<Output = TransportResult<T>>,
    {
        if self.is_closed() {
            return Err(TransportError::SessionClosed);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                if self.is_closed() {
                    Err(TransportError::SessionClosed)
                } else {
                    Err(TransportError::Cancelled)
                }
            }
            result = tokio::time::timeout(self.phase_timeout, phase) => match result {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Phase timed out after {:?}", self.phase_timeout);
                    Err(TransportError::Timeout {
                        seconds: self.phase_timeout.as_secs(),
                    })
                }
            },
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
