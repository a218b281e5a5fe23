//! Prelude module for vidsnap
//!
//! Re-exports the items needed to run extractions and to write a
//! collaborator, so one `use vidsnap::prelude::*;` covers typical usage.
//!
//! # Usage
//!
//! ```rust,no_run
//! use vidsnap::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None).await?;
//!     init_logging(&config.logging);
//!
//!     let service = ExtractionService::new(&config)?;
//!     let (handle, _events) = service
//!         .extractor(ExtractionRequest::new("https://cdn.example.com/a/master.m3u8"))
//!         .spawn();
//!     let outcome = handle.await?;
//!     println!("{:?}", outcome.error());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AnalysisError, AnalysisResult, AppError, ExtractionError, Result};

// Orchestration and collaborator authoring
pub use crate::app::{
    AnalysisContext, AnalyzePayload, Collaborator, ExtractionRequest, ExtractionService,
    Extractor, Registry,
};

// Result model
pub use crate::app::{
    AudioResource, ExtractionEvent, Formats, ImageResource, ManifestResource, Outcome,
    ProgressState, VideoResource,
};

// Transport and session
pub use crate::app::{HeaderSet, Platform, RedirectPolicy, Session};

// Configuration
pub use crate::config::{init_logging, AppConfig};

pub use std::sync::Arc;

// Common external crate re-exports for convenience
pub use async_trait::async_trait;
pub use tokio;
