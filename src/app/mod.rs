//! Core application logic for vidsnap
//!
//! This module contains the extraction pipeline: data models, the platform
//! table, the resilient transport, per-attempt sessions, the HLS manifest
//! parser and the orchestrator that drives site-specific collaborators.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vidsnap::app::{ExtractionRequest, ExtractionService, Outcome, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ExtractionService::from_transport(
//!     vidsnap::app::Transport::from_config(TransportConfig::default())?,
//! );
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let request = ExtractionRequest::new("https://cdn.example.com/show/master.m3u8");
//! let outcome = service.start(request, tx).await;
//!
//! while let Ok(event) = rx.try_recv() {
//!     println!("{:?}", event);
//! }
//! if let Outcome::Success(formats) = outcome {
//!     for post in formats {
//!         println!("{}: {} stream variants", post.title, post.manifest_data.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod extractor;
pub mod manifest;
pub mod models;
pub mod platform;
pub mod session;
pub mod transport;
pub mod util;

// Re-export main public API
pub use extractor::{
    AnalysisContext, AnalyzePayload, Collaborator, ExtractionRequest, ExtractionService,
    ExtractionStats, Extractor, ExtractorState, FinalizeConfig, HlsCollaborator, Lookup, Registry,
};
pub use models::{
    AudioResource, Cookie, ExtractionEvent, Formats, ImageResource, ManifestResource, Outcome,
    ProgressState, VideoResource,
};
pub use platform::{Platform, PlatformPolicy};
pub use session::{Session, SessionConfig};
pub use transport::{
    Fetched, HeaderSet, HttpExchange, ProbedSize, RawResponse, RedirectPolicy, ReqwestExchange,
    Transport, TransportConfig,
};
