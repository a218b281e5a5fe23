//! Transport and session behavior over a real HTTP stack
//!
//! These tests run the reqwest-backed exchange against local wiremock
//! servers.

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidsnap::app::{
    Fetched, HeaderSet, Platform, ProbedSize, RedirectPolicy, Session, SessionConfig, Transport,
    TransportConfig,
};
use vidsnap::errors::TransportError;

fn transport() -> Transport {
    let config = TransportConfig {
        retry_base_delay: Duration::from_millis(1),
        retry_jitter: Duration::from_millis(1),
        ..TransportConfig::default()
    };
    assert_ok!(Transport::from_config(config))
}

#[tokio::test]
async fn test_relative_redirect_is_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/watch/1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/watch/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("player page"))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/short", server.uri());
    let fetched = assert_ok!(transport().fetch(&url, &HeaderSet::new(), RedirectPolicy::Follow).await);
    assert_eq!(fetched.into_body().as_deref(), Some("player page"));
}

#[tokio::test]
async fn test_manual_policy_returns_redirect_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/elsewhere"))
        .mount(&server)
        .await;

    let url = format!("{}/short", server.uri());
    let raw = assert_ok!(
        transport()
            .fetch_raw(&url, &HeaderSet::new(), RedirectPolicy::Manual)
            .await
    );
    assert_eq!(raw.status, 301);
    assert_eq!(raw.location(), Some("/elsewhere"));
}

#[tokio::test]
async fn test_rate_limit_is_a_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/api", server.uri());
    let fetched = assert_ok!(
        transport()
            .fetch(&url, &HeaderSet::new(), RedirectPolicy::Follow)
            .await
    );
    assert!(matches!(fetched, Fetched::RateLimited));

    let error = assert_err!(fetched.require_body(&url));
    assert!(matches!(error, TransportError::RateLimited { .. }));
}

#[tokio::test]
async fn test_size_probe_reads_declared_length() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/video.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1234]))
        .mount(&server)
        .await;

    let transport = transport();
    let known = transport
        .probe_size(&format!("{}/video.mp4", server.uri()), &HeaderSet::new())
        .await;
    assert_eq!(known, ProbedSize::Known(1234));

    let missing = transport
        .probe_size(&format!("{}/gone.mp4", server.uri()), &HeaderSet::new())
        .await;
    assert_eq!(missing.bytes(), 0);
}

#[tokio::test]
async fn test_connection_failure_is_transient() {
    // Bind and release a port so connections to it are refused
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let result = transport()
        .fetch(&format!("{}/page", uri), &HeaderSet::new(), RedirectPolicy::Follow)
        .await;
    let error = assert_err!(result);
    assert!(error.is_transient(), "{:?}", error);
}

#[tokio::test]
async fn test_session_carries_cookies_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "tt_webid=42; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .and(header("Cookie", "tt_webid=42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::new(
        &transport(),
        Some(Platform::TikTok),
        format!("{}/login", server.uri()),
        None,
        &SessionConfig::default(),
        &CancellationToken::new(),
    );

    assert!(assert_ok!(session.check_availability(session.input_url()).await));
    let fetched = assert_ok!(session.get(&format!("{}/api/item", server.uri())).await);
    assert_eq!(fetched.into_body().as_deref(), Some("{\"ok\":true}"));

    let cookies = session.observed_cookies().await;
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].name, "tt_webid");
    assert_eq!(cookies[0].value, "42");

    session.close();
    let closed = session.get(&format!("{}/api/item", server.uri())).await;
    assert!(matches!(closed, Err(TransportError::SessionClosed)));
}

#[tokio::test]
async fn test_session_phase_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let session = Session::new(
        &transport(),
        None,
        format!("{}/slow", server.uri()),
        None,
        &SessionConfig {
            phase_timeout: Duration::from_millis(200),
        },
        &CancellationToken::new(),
    );

    let result = session.get(&format!("{}/slow", server.uri())).await;
    assert!(matches!(result, Err(TransportError::Timeout { .. })));
}
