//! Extraction orchestration
//!
//! This module drives one extraction attempt from an input URL to exactly
//! one terminal event. The site-specific work is delegated to a
//! [`Collaborator`]; everything around it lives here.
//!
//! # Lifecycle
//!
//! `Created -> Validating -> Probing -> Analyzing -> Finalizing -> Succeeded | Failed`
//!
//! - **Validating** rejects empty or unsupported URLs, unwraps link shims,
//!   picks the collaborator and applies its URL normalization
//! - **Probing** checks reachability; an unreachable page may still be
//!   analyzed (`forced`) when the platform allows it and credentials are present
//! - **Analyzing** calls the collaborator once; panics and errors are mapped
//!   to a single `ExtractionError`
//! - **Finalizing** confirms sizes and filters the drafts (see [`finalize`])
//!
//! Retries never cross this boundary; they live inside the transport.
//!
//! # Components
//!
//! - [`collaborator`] - the site-extractor trait and its analysis context
//! - [`registry`] - URL to collaborator lookup
//! - [`events`] - lifecycle-ordered event delivery
//! - [`finalize`] - concurrent size enrichment
//! - [`hls`] - built-in collaborator for HLS playlist links
//! - [`stats`] - per-attempt statistics
//!
//! # Examples
//!
//! ```rust,no_run
//! use vidsnap::app::{ExtractionRequest, ExtractionService};
//! use vidsnap::config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None).await?;
//! let service = ExtractionService::new(&config)?;
//!
//! let request = ExtractionRequest::new("https://cdn.example.com/show/master.m3u8");
//! let (handle, mut events) = service.extractor(request).spawn();
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! let outcome = handle.await?;
//! println!("success: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```

pub mod collaborator;
pub mod events;
pub mod finalize;
pub mod hls;
pub mod registry;
pub mod stats;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::app::models::{ExtractionEvent, Formats, Outcome};
use crate::app::session::{Session, SessionConfig};
use crate::app::transport::{HttpExchange, Transport, TransportConfig};
use crate::config::AppConfig;
use crate::constants::session::COOKIE_HEADER;
use crate::errors::{AnalysisError, ConfigResult, ExtractionError, ManifestError, TransportError};

pub use collaborator::{AnalysisContext, AnalyzePayload, Collaborator};
pub use events::EventEmitter;
pub use finalize::{finalize, FinalizeConfig, FinalizeReport};
pub use hls::HlsCollaborator;
pub use registry::{Lookup, Registry};
pub use stats::ExtractionStats;

/// Lifecycle state of one extraction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    Created,
    Validating,
    Probing,
    Analyzing,
    Finalizing,
    Succeeded,
    Failed,
}

impl ExtractorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for ExtractorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::Probing => "probing",
            Self::Analyzing => "analyzing",
            Self::Finalizing => "finalizing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the caller asks to extract
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub url: String,
    /// Opaque cookie string sent as the `Cookie` header
    pub cookies: Option<String>,
    pub payload: AnalyzePayload,
    /// Cancelling this token aborts the attempt, including in-flight probes
    pub cancel: CancellationToken,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cookies: None,
            payload: AnalyzePayload::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    pub fn with_payload(mut self, payload: AnalyzePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Entry point into the collaborator
enum Entry {
    Analyze(AnalyzePayload),
    Webpage(String),
}

/// One extraction attempt
///
/// An extractor is consumed by `start`, `test_webpage` or `spawn`, so it can
/// deliver at most one terminal event.
pub struct Extractor {
    request: ExtractionRequest,
    transport: Transport,
    registry: Arc<Registry>,
    session_config: SessionConfig,
    finalize_config: FinalizeConfig,
    state: ExtractorState,
    stats: ExtractionStats,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("url", &self.request.url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    pub fn new(
        request: ExtractionRequest,
        transport: Transport,
        registry: Arc<Registry>,
        session_config: SessionConfig,
        finalize_config: FinalizeConfig,
    ) -> Self {
        Self {
            request,
            transport,
            registry,
            session_config,
            finalize_config,
            state: ExtractorState::Created,
            stats: ExtractionStats::default(),
        }
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    /// Run the attempt, sending progress and the terminal event to `events`
    pub async fn start(mut self, events: UnboundedSender<ExtractionEvent>) -> Outcome {
        let emitter = EventEmitter::new(events);
        emitter.start();
        let payload = std::mem::take(&mut self.request.payload);
        let result = self.attempt(&emitter, Entry::Analyze(payload)).await;
        self.complete(&emitter, result)
    }

    /// Run a captured document through the collaborator, skipping the probe
    pub async fn test_webpage(
        mut self,
        document: impl Into<String>,
        events: UnboundedSender<ExtractionEvent>,
    ) -> Outcome {
        let emitter = EventEmitter::new(events);
        emitter.start();
        let result = self.attempt(&emitter, Entry::Webpage(document.into())).await;
        self.complete(&emitter, result)
    }

    /// Run the attempt on its own task
    pub fn spawn(self) -> (JoinHandle<Outcome>, UnboundedReceiver<ExtractionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.start(tx));
        (handle, rx)
    }

    fn transition(&mut self, next: ExtractorState) {
        debug!("Extraction of {}: {} -> {}", self.request.url, self.state, next);
        self.state = next;
    }

    fn complete(&mut self, emitter: &EventEmitter, result: Result<Vec<Formats>, ExtractionError>) -> Outcome {
        let outcome = match result {
            Ok(formats) => {
                self.transition(ExtractorState::Succeeded);
                self.stats.formats_kept = formats.len();
                Outcome::Success(formats)
            }
            Err(e) => {
                self.transition(ExtractorState::Failed);
                match &e {
                    ExtractionError::InternalError { .. } => error!("Extraction of {} failed: {}", self.request.url, e),
                    _ => warn!("Extraction of {} failed: {}", self.request.url, e),
                }
                Outcome::Failed(e)
            }
        };

        self.stats.progress_events = emitter.middle_count();
        self.stats.finish();
        self.stats.log_summary(&self.request.url);

        emitter.finish(&outcome);
        outcome
    }

    /// Validate, then drive the session until cancelled or done
    async fn attempt(&mut self, emitter: &EventEmitter, entry: Entry) -> Result<Vec<Formats>, ExtractionError> {
        self.transition(ExtractorState::Validating);

        let (collaborator, url) = self.select_collaborator()?;
        let mut session = Session::new(
            &self.transport,
            Some(collaborator.platform()),
            url.as_str(),
            self.request.cookies.as_deref(),
            &self.session_config,
            &self.request.cancel,
        );

        let normalized = collaborator.normalize_url(&url, session.has_credentials());
        if !is_web_url(&normalized) {
            session.close();
            return Err(ExtractionError::InvalidUrl);
        }
        if normalized != url {
            debug!("Normalized {} to {}", url, normalized);
        }
        session.set_input_url(normalized);

        let cancel = self.request.cancel.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Extraction of {} cancelled", url);
                Err(ExtractionError::non_fatal("Extraction cancelled"))
            }
            result = self.drive(&session, collaborator.as_ref(), emitter, entry) => result,
        };

        session.close();
        result
    }

    fn select_collaborator(&self) -> Result<(Arc<dyn Collaborator>, String), ExtractionError> {
        let url = self.request.url.trim();
        if url.is_empty() {
            return Err(ExtractionError::InvalidUrl);
        }

        match self.registry.find(url) {
            Lookup::Found { collaborator, url } => {
                info!("Extracting {} with the {} collaborator", url, collaborator.platform());
                Ok((collaborator, url))
            }
            Lookup::Known(platform) => {
                info!("No collaborator registered for {}", platform);
                Err(ExtractionError::MethodMissingLogic)
            }
            Lookup::Unknown => Err(ExtractionError::InvalidUrl),
            Lookup::BrokenShim => Err(ExtractionError::internal(format!(
                "Unable to recover the link target of {}",
                url
            ))),
        }
    }

    async fn drive(
        &mut self,
        session: &Session,
        collaborator: &dyn Collaborator,
        emitter: &EventEmitter,
        entry: Entry,
    ) -> Result<Vec<Formats>, ExtractionError> {
        let mut ctx = AnalysisContext::new(session, emitter);

        let analysis = match entry {
            Entry::Analyze(payload) => {
                self.transition(ExtractorState::Probing);
                let payload = probe(session, payload).await?;
                self.transition(ExtractorState::Analyzing);
                AssertUnwindSafe(collaborator.analyze(&mut ctx, payload))
                    .catch_unwind()
                    .await
            }
            Entry::Webpage(document) => {
                self.transition(ExtractorState::Analyzing);
                AssertUnwindSafe(collaborator.test_webpage(&mut ctx, &document))
                    .catch_unwind()
                    .await
            }
        };

        let (drafts, failure) = ctx.into_parts();
        if let Some(failure) = failure {
            return Err(failure);
        }
        match analysis {
            Err(panic) => {
                return Err(ExtractionError::internal(format!(
                    "Collaborator panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
            Ok(Err(e)) => return Err(map_analysis_error(e, session)),
            Ok(Ok(())) => {}
        }

        if drafts.is_empty() {
            return Err(ExtractionError::non_fatal("No media found"));
        }

        self.transition(ExtractorState::Finalizing);
        self.stats.drafts = drafts.len();
        emitter.end();

        let report = finalize(session, drafts, &self.finalize_config).await;
        self.stats.probes_issued = report.probes_issued;
        self.stats.probes_failed = report.probes_failed;
        Ok(report.formats)
    }
}

/// Reachability probe; decides whether analysis runs and whether it is forced
async fn probe(session: &Session, mut payload: AnalyzePayload) -> Result<AnalyzePayload, ExtractionError> {
    let url = session.input_url();
    let available = match session.check_availability(url).await {
        Ok(available) => available,
        Err(e @ (TransportError::Cancelled | TransportError::SessionClosed | TransportError::InvalidUrl { .. })) => {
            return Err(map_transport_error(e, session))
        }
        Err(e @ TransportError::InvalidHeader { .. }) if is_cookie_header_error(&e) => {
            return Err(map_transport_error(e, session))
        }
        Err(e) => {
            debug!("Availability probe of {} failed: {}", url, e);
            false
        }
    };

    if available {
        payload.forced = false;
        return Ok(payload);
    }

    if session.policy().forceable_with_credentials && session.has_credentials() {
        info!("{} looks unavailable; analyzing with credentials anyway", url);
        payload.forced = true;
        return Ok(payload);
    }

    Err(ExtractionError::non_fatal("The requested page is missing"))
}

fn is_cookie_header_error(error: &TransportError) -> bool {
    matches!(error, TransportError::InvalidHeader { name } if name.eq_ignore_ascii_case(COOKIE_HEADER))
}

fn is_web_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some())
        .unwrap_or(false)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Map a collaborator error to the single terminal error of the attempt
pub fn map_analysis_error(error: AnalysisError, session: &Session) -> ExtractionError {
    match error {
        AnalysisError::Extraction(e) => e,
        AnalysisError::Transport(e) => map_transport_error(e, session),
        AnalysisError::Manifest(e) => map_manifest_error(e, session),
        AnalysisError::Json(e) => ExtractionError::internal_with_cause("Unexpected response format", e),
        AnalysisError::Other(e) => {
            let message = e.to_string();
            let cause: Box<dyn std::error::Error + Send + Sync> = e.into();
            ExtractionError::InternalError {
                message,
                cause: Some(Arc::from(cause)),
            }
        }
    }
}

pub fn map_transport_error(error: TransportError, session: &Session) -> ExtractionError {
    let cookies_were_present = session.has_credentials();
    let platform_404 = session
        .platform()
        .filter(|platform| platform.policy().reports_platform_404);

    match error {
        TransportError::InvalidCredentials { .. } => ExtractionError::InvalidCookies,
        TransportError::UnexpectedStatus { status: 401 | 403, .. } => {
            if cookies_were_present {
                ExtractionError::InvalidCookies
            } else {
                ExtractionError::LoginRequired
            }
        }
        TransportError::UnexpectedStatus { status, .. } if (400..500).contains(&status) => match platform_404 {
            Some(platform) => ExtractionError::PlatformSpecific404 {
                platform,
                cookies_were_present,
            },
            None => ExtractionError::non_fatal("The requested page is missing"),
        },
        ref e if is_cookie_header_error(e) => ExtractionError::InvalidCookies,
        TransportError::InvalidUrl { .. } => ExtractionError::InvalidUrl,
        TransportError::Cancelled | TransportError::SessionClosed => ExtractionError::non_fatal("Extraction cancelled"),
        e @ TransportError::RateLimited { .. } => ExtractionError::non_fatal(format!("{}, try again later", e)),
        e if e.is_transient() => ExtractionError::non_fatal(format!("{}, retry advisable", e)),
        other => ExtractionError::internal_with_cause("Transport failure", other),
    }
}

pub fn map_manifest_error(error: ManifestError, session: &Session) -> ExtractionError {
    match error {
        ManifestError::Transport(e) => map_transport_error(e, session),
        e @ ManifestError::Unreachable { .. } => ExtractionError::non_fatal(e.to_string()),
        e if e.is_content_error() => ExtractionError::non_fatal(e.to_string()),
        other => ExtractionError::internal_with_cause("Manifest could not be resolved", other),
    }
}

/// Builds extractors that share one transport and registry
///
/// The HTTP client and its connection pool are shared by every attempt;
/// cookies and headers stay inside each attempt's session.
#[derive(Clone)]
pub struct ExtractionService {
    transport: Transport,
    registry: Arc<Registry>,
    session_config: SessionConfig,
    finalize_config: FinalizeConfig,
}

impl fmt::Debug for ExtractionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionService")
            .field("registry", &self.registry)
            .field("session_config", &self.session_config)
            .field("finalize_config", &self.finalize_config)
            .finish_non_exhaustive()
    }
}

impl ExtractionService {
    /// Service over the default reqwest transport
    pub fn new(config: &AppConfig) -> ConfigResult<Self> {
        let (transport_config, session_config, finalize_config) = config.to_runtime_config()?;
        let transport = Transport::from_config(transport_config)?;
        Ok(Self::from_transport(transport)
            .with_session_config(session_config)
            .with_finalize_config(finalize_config))
    }

    /// Service over a caller-supplied transport with default settings
    pub fn from_transport(transport: Transport) -> Self {
        Self {
            transport,
            registry: Arc::new(Registry::with_defaults()),
            session_config: SessionConfig::default(),
            finalize_config: FinalizeConfig::default(),
        }
    }

    /// Replace the default transport with a caller-supplied exchange
    ///
    /// The exchange is used as-is; session timeouts still apply.
    pub fn with_exchange(exchange: Arc<dyn HttpExchange>, config: TransportConfig) -> Self {
        Self::from_transport(Transport::new(exchange, config))
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn with_finalize_config(mut self, config: FinalizeConfig) -> Self {
        self.finalize_config = config;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Extractor for one attempt
    pub fn extractor(&self, request: ExtractionRequest) -> Extractor {
        Extractor::new(
            request,
            self.transport.clone(),
            Arc::clone(&self.registry),
            self.session_config.clone(),
            self.finalize_config.clone(),
        )
    }

    /// Run one attempt to completion
    pub async fn start(&self, request: ExtractionRequest, events: UnboundedSender<ExtractionEvent>) -> Outcome {
        self.extractor(request).start(events).await
    }
}
