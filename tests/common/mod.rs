//! Shared fixtures for integration tests
//!
//! `FakeWeb` is a deterministic `HttpExchange`: every URL answers from a
//! table, HEAD requests report a configured `Content-Length`, and optional
//! per-URL delays scramble the order in which concurrent requests complete.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use vidsnap::app::transport::{ExchangeRequest, Method};
use vidsnap::app::{
    ExtractionEvent, ExtractionService, HttpExchange, ProgressState, RawResponse, Registry,
    TransportConfig,
};
use vidsnap::errors::TransportResult;

#[derive(Debug, Clone)]
struct Page {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    size: Option<u64>,
    delay: Duration,
}

impl Page {
    fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            size: None,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeWeb {
    pages: Mutex<HashMap<String, Page>>,
    calls: Mutex<Vec<(Method, String)>>,
    started: Mutex<Vec<(String, Instant)>>,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    /// 200 page whose HEAD size is the body length
    pub fn page(self, url: &str, body: &str) -> Self {
        let mut page = Page::new(200);
        page.body = body.to_string();
        page.size = Some(body.len() as u64);
        self.insert(url, page)
    }

    /// Asset reporting `size` bytes after `delay`
    pub fn asset(self, url: &str, size: u64, delay: Duration) -> Self {
        let mut page = Page::new(200);
        page.size = Some(size);
        page.delay = delay;
        self.insert(url, page)
    }

    pub fn status(self, url: &str, status: u16) -> Self {
        self.insert(url, Page::new(status))
    }

    pub fn redirect(self, url: &str, status: u16, location: &str) -> Self {
        let mut page = Page::new(status);
        page.headers.push(("Location".to_string(), location.to_string()));
        self.insert(url, page)
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|(_, u)| u == url).count()
    }

    /// When the first request to `url` arrived
    pub fn first_started(&self, url: &str) -> Option<Instant> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, at)| *at)
    }

    fn insert(self, url: &str, page: Page) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), page);
        self
    }
}

#[async_trait]
impl HttpExchange for FakeWeb {
    async fn exchange(&self, request: ExchangeRequest) -> TransportResult<RawResponse> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push((request.method, url.clone()));
        self.started.lock().unwrap().push((url.clone(), Instant::now()));

        let page = self
            .pages
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Page::new(404));

        if !page.delay.is_zero() {
            tokio::time::sleep(page.delay).await;
        }

        let mut response = RawResponse::new(page.status, request.url.clone());
        for (name, value) in &page.headers {
            response = response.with_header(name, value);
        }
        if let Some(size) = page.size {
            response = response.with_header("Content-Length", &size.to_string());
        }
        if request.method != Method::Head {
            response = response.with_body(page.body);
        }
        Ok(response)
    }
}

/// Service over `web` with fast retries
pub fn service(web: Arc<FakeWeb>, registry: Registry) -> ExtractionService {
    let config = TransportConfig {
        retry_base_delay: Duration::from_millis(1),
        retry_jitter: Duration::from_millis(1),
        ..TransportConfig::default()
    };
    ExtractionService::with_exchange(web, config).with_registry(registry)
}

pub fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ExtractionEvent>) -> Vec<ExtractionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Assert the lifecycle order and return the number of Middle events
pub fn assert_lifecycle(events: &[ExtractionEvent], expect_end: bool) -> usize {
    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1, "exactly one terminal event: {:?}", events);
    assert!(events.last().unwrap().is_terminal(), "terminal event comes last");
    assert!(matches!(events[0], ExtractionEvent::Progress(ProgressState::Start)));

    let ends = events
        .iter()
        .filter(|e| matches!(e, ExtractionEvent::Progress(ProgressState::End)))
        .count();
    assert_eq!(ends, usize::from(expect_end));
    if expect_end {
        assert!(matches!(
            events[events.len() - 2],
            ExtractionEvent::Progress(ProgressState::End)
        ));
    }

    events
        .iter()
        .filter(|e| matches!(e, ExtractionEvent::Progress(ProgressState::Middle)))
        .count()
}
