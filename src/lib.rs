//! vidsnap
//!
//! Resolves social-media post URLs into downloadable media assets. The crate
//! drives site-specific collaborators through a fixed lifecycle over a
//! resilient HTTP transport, confirms asset sizes concurrently and reports
//! exactly one terminal outcome per attempt.

pub mod app;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, ExtractionError, Result};
