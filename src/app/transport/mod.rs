//! Resilient HTTP transport
//!
//! `Transport` sits on top of an [`HttpExchange`] and adds what upstream
//! social-media servers force on every caller:
//!
//! - redirect chasing with loop detection, a hop budget and a local-target
//!   guard ([`redirect`])
//! - status classification into sentinels ([`Fetched`]) instead of errors
//!   for expected behavior such as 429 rate limiting
//! - retries with exponential backoff for transient connection faults
//! - a size probe that never fails ([`ProbedSize`])
//!
//! A `Transport` is cheap to clone. The exchange below it may be shared
//! between attempts; headers are passed explicitly on every call.

pub mod config;
pub mod exchange;
pub mod headers;
pub mod redirect;

use std::sync::Arc;

use url::Url;

pub use config::TransportConfig;
pub use exchange::{ExchangeRequest, HttpExchange, Method, RawResponse, ReqwestExchange};
pub use headers::HeaderSet;
pub use redirect::{Chase, ChaseEnd, RedirectPolicy};

use crate::app::platform::{policy_for, PlatformPolicy};
use crate::constants::{http, session::COOKIE_HEADER};
use crate::errors::{ConfigResult, TransportError, TransportResult};

/// Classified body fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// 2xx response body
    Body(String),
    /// Server answered 429; the caller may pick another extraction path
    RateLimited,
    /// Platform signalled that the supplied cookies were rejected
    InvalidCredentials,
    /// Any other status; logged, not raised
    Absent { status: u16 },
}

impl Fetched {
    pub fn into_body(self) -> Option<String> {
        match self {
            Self::Body(body) => Some(body),
            _ => None,
        }
    }

    /// Body, or the sentinel turned into an error
    pub fn require_body(self, url: &str) -> TransportResult<String> {
        match self {
            Self::Body(body) => Ok(body),
            Self::RateLimited => Err(TransportError::RateLimited {
                url: url.to_string(),
            }),
            Self::InvalidCredentials => Err(TransportError::InvalidCredentials {
                url: url.to_string(),
            }),
            Self::Absent { status } => Err(TransportError::UnexpectedStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// Result of a size probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbedSize {
    Known(u64),
    /// Length absent or target unreachable
    Unknown,
}

impl ProbedSize {
    /// Size in bytes, 0 when unknown
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Known(size) => *size,
            Self::Unknown => 0,
        }
    }
}

/// HTTP transport with redirects, classification and retries
#[derive(Clone)]
pub struct Transport {
    exchange: Arc<dyn HttpExchange>,
    config: Arc<TransportConfig>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(exchange: Arc<dyn HttpExchange>, config: TransportConfig) -> Self {
        Self {
            exchange,
            config: Arc::new(config),
        }
    }

    /// Transport over the default `reqwest` exchange
    pub fn from_config(config: TransportConfig) -> ConfigResult<Self> {
        let exchange = ReqwestExchange::from_config(&config)?;
        Ok(Self::new(Arc::new(exchange), config))
    }

    /// Same policies over a different exchange
    pub fn with_exchange(&self, exchange: Arc<dyn HttpExchange>) -> Self {
        Self {
            exchange,
            config: Arc::clone(&self.config),
        }
    }

    pub fn exchange(&self) -> Arc<dyn HttpExchange> {
        Arc::clone(&self.exchange)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// GET `url` and classify the final response
    pub async fn fetch(
        &self,
        url: &str,
        headers: &HeaderSet,
        policy: RedirectPolicy,
    ) -> TransportResult<Fetched> {
        let url = parse_url(url)?;
        let platform_policy = policy_for(&url);
        let chase = self
            .send(ExchangeRequest::get(url, headers.clone()), policy)
            .await?;
        Ok(classify(chase, headers, &platform_policy))
    }

    /// GET `url` and hand back the unclassified final response
    pub async fn fetch_raw(
        &self,
        url: &str,
        headers: &HeaderSet,
        policy: RedirectPolicy,
    ) -> TransportResult<RawResponse> {
        let url = parse_url(url)?;
        let chase = self
            .send(ExchangeRequest::get(url, headers.clone()), policy)
            .await?;
        Ok(chase.response)
    }

    /// POST a JSON document and classify the final response
    pub async fn post_json(
        &self,
        url: &str,
        headers: &HeaderSet,
        body: &serde_json::Value,
    ) -> TransportResult<Fetched> {
        let url = parse_url(url)?;
        let platform_policy = policy_for(&url);
        let headers = if headers.contains("Content-Type") {
            headers.clone()
        } else {
            headers.with("Content-Type", "application/json")
        };
        let request = ExchangeRequest::post(url, headers.clone(), body.to_string());
        let chase = self.send(request, RedirectPolicy::Follow).await?;
        Ok(classify(chase, &headers, &platform_policy))
    }

    /// Declared size of `url`, never an error
    pub async fn probe_size(&self, url: &str, headers: &HeaderSet) -> ProbedSize {
        let parsed = match parse_url(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Size probe skipped: {}", e);
                return ProbedSize::Unknown;
            }
        };

        match self
            .send(ExchangeRequest::head(parsed, headers.clone()), RedirectPolicy::Follow)
            .await
        {
            Ok(chase) if chase.response.is_success() => match chase.response.content_length() {
                Some(size) => ProbedSize::Known(size),
                None => {
                    tracing::debug!("No Content-Length for {}", url);
                    ProbedSize::Unknown
                }
            },
            Ok(chase) => {
                tracing::debug!("Size probe of {} answered {}", url, chase.response.status);
                ProbedSize::Unknown
            }
            Err(e) => {
                tracing::debug!("Size probe of {} failed: {}", url, e);
                ProbedSize::Unknown
            }
        }
    }

    /// Lightweight reachability check (HEAD)
    ///
    /// The page counts as available when the final status is one of the
    /// accepted statuses, or when the chase ended on a redirect it refused to
    /// follow further.
    pub async fn check_availability(&self, url: &str, headers: &HeaderSet) -> TransportResult<bool> {
        let url = parse_url(url)?;
        let platform_policy = policy_for(&url);
        let chase = self
            .send(ExchangeRequest::head(url, headers.clone()), RedirectPolicy::Follow)
            .await?;

        let status = chase.response.status;
        let available = http::AVAILABLE_STATUSES.contains(&status)
            || (status == 500 && platform_policy.server_error_means_invalid_credentials)
            || chase.response.is_redirect();
        tracing::debug!("Availability of {}: HTTP {} -> {}", chase.response.url, status, available);
        Ok(available)
    }

    /// One exchange, retried on transient faults with exponential backoff
    async fn send_with_retry(&self, request: ExchangeRequest) -> TransportResult<RawResponse> {
        let mut retries = 0;
        loop {
            match self.exchange.exchange(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && retries < self.config.max_retries => {
                    retries += 1;
                    let delay = self.config.backoff(retries);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        retries,
                        self.config.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(
                            "Request to {} failed after {} retries: {}",
                            request.url,
                            retries,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn parse_url(url: &str) -> TransportResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(TransportError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {}", scheme),
        }),
    }
}

fn classify(chase: Chase, headers: &HeaderSet, policy: &PlatformPolicy) -> Fetched {
    let response = chase.response;

    if chase.end == ChaseEnd::BudgetExhausted
        && policy.server_error_means_invalid_credentials
        && headers.contains(COOKIE_HEADER)
    {
        tracing::warn!("Redirect budget exhausted with cookies at {}", response.url);
        return Fetched::InvalidCredentials;
    }

    match response.status {
        200..=299 => Fetched::Body(response.body),
        500 if policy.server_error_means_invalid_credentials => {
            tracing::warn!("HTTP 500 from {} read as rejected credentials", response.url);
            Fetched::InvalidCredentials
        }
        429 => {
            tracing::warn!("Rate limited by {}", response.url);
            Fetched::RateLimited
        }
        status => {
            tracing::warn!(
                "Unclassified HTTP {} from {}: {}",
                status,
                response.url,
                response.body_excerpt()
            );
            Fetched::Absent { status }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Scripted exchange keyed by URL
    #[derive(Default)]
    struct Scripted {
        routes: HashMap<String, (u16, Vec<(&'static str, String)>, String)>,
        flaky: Mutex<HashMap<String, usize>>,
        calls: Mutex<Vec<(Method, String)>>,
    }

    impl Scripted {
        fn route(mut self, url: &str, status: u16, headers: &[(&'static str, &str)], body: &str) -> Self {
            let headers = headers.iter().map(|(n, v)| (*n, v.to_string())).collect();
            self.routes
                .insert(url.to_string(), (status, headers, body.to_string()));
            self
        }

        fn flaky(self, url: &str, failures: usize) -> Self {
            self.flaky.lock().unwrap().insert(url.to_string(), failures);
            self
        }

        fn calls(&self) -> Vec<(Method, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpExchange for Scripted {
        async fn exchange(&self, request: ExchangeRequest) -> TransportResult<RawResponse> {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push((request.method, url.clone()));

            if let Some(remaining) = self.flaky.lock().unwrap().get_mut(&url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::Transient {
                        url,
                        reason: "connection reset".to_string(),
                    });
                }
            }

            let (status, headers, body) = self
                .routes
                .get(&url)
                .cloned()
                .unwrap_or((404, Vec::new(), String::new()));
            let mut response = RawResponse::new(status, request.url).with_body(body);
            for (name, value) in headers {
                response = response.with_header(name, &value);
            }
            Ok(response)
        }
    }

    fn transport(scripted: Scripted) -> (Transport, Arc<Scripted>) {
        let scripted = Arc::new(scripted);
        let config = TransportConfig {
            retry_base_delay: Duration::ZERO,
            retry_jitter: Duration::ZERO,
            ..Default::default()
        };
        (Transport::new(scripted.clone(), config), scripted)
    }

    #[tokio::test]
    async fn test_redirect_cycle_returns_first_response() {
        let (transport, scripted) = transport(
            Scripted::default()
                .route("https://a.example.com/", 302, &[("Location", "https://b.example.com/")], "")
                .route("https://b.example.com/", 302, &[("Location", "https://a.example.com/")], ""),
        );

        let response = transport
            .fetch_raw("https://a.example.com/", &HeaderSet::new(), RedirectPolicy::Follow)
            .await
            .unwrap();

        // A -> B -> A stops before re-requesting A
        assert_eq!(response.status, 302);
        assert_eq!(response.url.as_str(), "https://a.example.com/");
        assert_eq!(scripted.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_self_redirect_stops_immediately() {
        let (transport, scripted) = transport(Scripted::default().route(
            "https://a.example.com/x",
            301,
            &[("Location", "/x")],
            "",
        ));

        let response = transport
            .fetch_raw("https://a.example.com/x", &HeaderSet::new(), RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(response.status, 301);
        assert_eq!(scripted.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_relative_and_scheme_relative_redirects() {
        let (transport, _) = transport(
            Scripted::default()
                .route("https://a.example.com/start", 302, &[("Location", "//cdn.example.com/mid")], "")
                .route("https://cdn.example.com/mid", 307, &[("Location", "../final?x=1")], "")
                .route("https://cdn.example.com/final?x=1", 200, &[], "done"),
        );

        let fetched = transport
            .fetch("https://a.example.com/start", &HeaderSet::new(), RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(fetched, Fetched::Body("done".to_string()));
    }

    #[tokio::test]
    async fn test_manual_policy_returns_redirect() {
        let (transport, scripted) = transport(Scripted::default().route(
            "https://a.example.com/",
            302,
            &[("Location", "https://b.example.com/")],
            "",
        ));

        let response = transport
            .fetch_raw("https://a.example.com/", &HeaderSet::new(), RedirectPolicy::Manual)
            .await
            .unwrap();
        assert_eq!(response.location(), Some("https://b.example.com/"));
        assert_eq!(scripted.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_to_localhost_is_refused() {
        let (transport, scripted) = transport(Scripted::default().route(
            "https://a.example.com/",
            302,
            &[("Location", "http://127.0.0.1:8080/admin")],
            "",
        ));

        let response = transport
            .fetch_raw("https://a.example.com/", &HeaderSet::new(), RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(scripted.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_with_cookies_on_instagram() {
        // Endless chain of distinct URLs
        let mut scripted = Scripted::default();
        for i in 0..=http::MAX_REDIRECTS {
            let from = format!("https://www.instagram.com/p/{}/", i);
            let to = format!("https://www.instagram.com/p/{}/", i + 1);
            scripted = scripted.route(&from, 302, &[("Location", to.as_str())], "");
        }
        let (transport, scripted) = transport(scripted);

        let with_cookie = HeaderSet::new().with("Cookie", "sessionid=stale");
        let fetched = transport
            .fetch("https://www.instagram.com/p/0/", &with_cookie, RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(fetched, Fetched::InvalidCredentials);
        assert_eq!(scripted.calls().len(), http::MAX_REDIRECTS + 1);

        let anonymous = transport
            .fetch("https://www.instagram.com/p/0/", &HeaderSet::new(), RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(anonymous, Fetched::Absent { status: 302 });
    }

    #[tokio::test]
    async fn test_status_classification() {
        let (transport, _) = transport(
            Scripted::default()
                .route("https://www.instagram.com/api/", 500, &[], "boom")
                .route("https://vimeo.com/api/", 500, &[], "boom")
                .route("https://vimeo.com/busy/", 429, &[], ""),
        );
        let headers = HeaderSet::new();

        let instagram = transport
            .fetch("https://www.instagram.com/api/", &headers, RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(instagram, Fetched::InvalidCredentials);

        let vimeo = transport
            .fetch("https://vimeo.com/api/", &headers, RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(vimeo, Fetched::Absent { status: 500 });

        let busy = transport
            .fetch("https://vimeo.com/busy/", &headers, RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(busy, Fetched::RateLimited);
        assert!(matches!(
            busy.require_body("https://vimeo.com/busy/"),
            Err(TransportError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_fault_is_retried() {
        let (transport, scripted) = transport(
            Scripted::default()
                .route("https://a.example.com/", 200, &[], "ok")
                .flaky("https://a.example.com/", 2),
        );

        let fetched = transport
            .fetch("https://a.example.com/", &HeaderSet::new(), RedirectPolicy::Follow)
            .await
            .unwrap();
        assert_eq!(fetched, Fetched::Body("ok".to_string()));
        assert_eq!(scripted.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_transient_fault_surfaces_after_retries() {
        let (transport, scripted) = transport(
            Scripted::default()
                .route("https://a.example.com/", 200, &[], "ok")
                .flaky("https://a.example.com/", 10),
        );

        let result = transport
            .fetch("https://a.example.com/", &HeaderSet::new(), RedirectPolicy::Follow)
            .await;
        assert!(matches!(result, Err(TransportError::Transient { .. })));
        assert_eq!(
            scripted.calls().len(),
            1 + crate::constants::MAX_RETRIES as usize
        );
    }

    #[tokio::test]
    async fn test_probe_size_sentinels() {
        let (transport, scripted) = transport(
            Scripted::default()
                .route("https://cdn.example.com/a.mp4", 200, &[("Content-Length", "1024")], "")
                .route("https://cdn.example.com/b.mp4", 200, &[], "")
                .route("https://cdn.example.com/c.mp4", 302, &[("Location", "/a.mp4")], ""),
        );
        let headers = HeaderSet::new();

        assert_eq!(
            transport.probe_size("https://cdn.example.com/a.mp4", &headers).await,
            ProbedSize::Known(1024)
        );
        assert_eq!(
            transport.probe_size("https://cdn.example.com/b.mp4", &headers).await,
            ProbedSize::Unknown
        );
        assert_eq!(
            transport.probe_size("https://cdn.example.com/missing.mp4", &headers).await,
            ProbedSize::Unknown
        );
        assert_eq!(
            transport.probe_size("https://cdn.example.com/c.mp4", &headers).await,
            ProbedSize::Known(1024)
        );
        assert_eq!(transport.probe_size("not a url", &headers).await.bytes(), 0);

        // Probes are metadata-only requests
        assert!(scripted.calls().iter().all(|(method, _)| *method == Method::Head));
    }

    #[tokio::test]
    async fn test_check_availability() {
        let (transport, _) = transport(
            Scripted::default()
                .route("https://vimeo.com/1", 200, &[], "")
                .route("https://vimeo.com/2", 206, &[], "")
                .route("https://www.instagram.com/p/x/", 500, &[], "")
                .route("https://vimeo.com/3", 500, &[], ""),
        );
        let headers = HeaderSet::new();

        assert!(transport.check_availability("https://vimeo.com/1", &headers).await.unwrap());
        assert!(transport.check_availability("https://vimeo.com/2", &headers).await.unwrap());
        assert!(transport
            .check_availability("https://www.instagram.com/p/x/", &headers)
            .await
            .unwrap());
        assert!(!transport.check_availability("https://vimeo.com/3", &headers).await.unwrap());
        assert!(!transport.check_availability("https://vimeo.com/404", &headers).await.unwrap());
        assert!(matches!(
            transport.check_availability("ftp://vimeo.com/1", &headers).await,
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_post_json_follows_as_get() {
        let (transport, scripted) = transport(
            Scripted::default()
                .route("https://api.example.com/graphql", 302, &[("Location", "/result")], "")
                .route("https://api.example.com/result", 200, &[], "{\"ok\":true}"),
        );

        let fetched = transport
            .post_json(
                "https://api.example.com/graphql",
                &HeaderSet::new(),
                &serde_json::json!({"query": "x"}),
            )
            .await
            .unwrap();
        assert_eq!(fetched, Fetched::Body("{\"ok\":true}".to_string()));

        let calls = scripted.calls();
        assert_eq!(calls[0].0, Method::Post);
        assert_eq!(calls[1].0, Method::Get);
    }
}
