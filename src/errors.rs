//! Error types for vidsnap
//!
//! Each layer has its own error enum. Transport and manifest errors are
//! internal classifications; `ExtractionError` is the only error that crosses
//! the public boundary of an extraction attempt, delivered inside a terminal
//! `Failed` event.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::app::platform::Platform;

/// Transport-level errors
///
/// Expected upstream behavior (rate limiting, unclassified statuses) is not an
/// error here; those come back as sentinels from the transport. These variants
/// are what is left once classification is done.
#[derive(Error, Debug)]
pub enum TransportError {
    /// URL could not be parsed or resolved
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Header name or value cannot be framed on the wire
    #[error("Invalid header: {name}")]
    InvalidHeader { name: String },

    /// TLS handshake failure, connection reset or socket timeout; a retry is advisable
    #[error("Connection problem while requesting {url}: {reason}")]
    Transient { url: String, reason: String },

    /// A phase exceeded the session's fixed time bound
    #[error("Request phase timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The attempt was cancelled by its owner
    #[error("Request cancelled")]
    Cancelled,

    /// The session already released its transport
    #[error("Session is closed")]
    SessionClosed,

    /// Server answered 429
    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    /// Server behavior indicates the supplied cookies were rejected
    #[error("Credentials rejected by {url}")]
    InvalidCredentials { url: String },

    /// Status the caller required to be 200 was something else
    #[error("Unexpected HTTP {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Non-transient HTTP client failure
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Why a manifest cannot be downloaded with plain segment fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedReason {
    FlashAccess,
    FairPlay,
    Encryption { method: String },
    InitializationMap,
    ByteRange,
}

impl std::fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FlashAccess => write!(f, "Adobe Flash access protected stream"),
            Self::FairPlay => write!(f, "Apple FairPlay protected stream"),
            Self::Encryption { method } => write!(f, "unsupported encryption method {}", method),
            Self::InitializationMap => write!(f, "initialization map segments"),
            Self::ByteRange => write!(f, "byte-range addressed segments"),
        }
    }
}

/// Streaming-playlist parsing and resolution errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Playlist needs capabilities this crate does not have
    #[error("Manifest can't be downloaded: {reason}")]
    NotDownloadable { reason: UnsupportedReason },

    /// Playlist could not be fetched
    #[error("Unable to fetch manifest from {url}")]
    Unreachable { url: String },

    /// Live streams have no fixed segment list
    #[error("Live stream can't be downloaded")]
    LiveStream,

    /// Master playlists nested deeper than allowed
    #[error("Master playlist nesting exceeds {depth} levels")]
    TooDeep { depth: usize },

    /// Segment or variant reference could not be resolved
    #[error("Invalid manifest reference {reference} against {base}")]
    InvalidReference { base: String, reference: String },

    /// Transport failure while fetching a playlist
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ManifestError {
    /// Errors that describe the content rather than a broken exchange
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::NotDownloadable { .. } | Self::LiveStream | Self::TooDeep { .. }
        )
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// HTTP client could not be built from the configuration
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),
}

/// Terminal error of an extraction attempt
///
/// Variant identity is the contract; messages are informational.
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    /// Empty, unparsable or unsupported input URL
    #[error("Invalid URL")]
    InvalidUrl,

    /// Content needs a logged-in session
    #[error("Login required to access this media")]
    LoginRequired,

    /// Supplied cookies were rejected by the platform
    #[error("Supplied cookies are invalid or expired")]
    InvalidCookies,

    /// Unexpected fault, with the original cause kept for diagnostics
    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// Expected failure the caller can report as-is
    #[error("{message}")]
    NonFatalError { message: String },

    /// Platform answered "not found" for a post
    #[error("{platform} post not found (cookies used: {cookies_were_present})")]
    PlatformSpecific404 {
        platform: Platform,
        cookies_were_present: bool,
    },

    /// URL shape recognized but extraction logic is missing
    #[error("Missing implementation logic")]
    MethodMissingLogic,
}

impl ExtractionError {
    /// Create a non-fatal error with a message
    pub fn non_fatal(message: impl Into<String>) -> Self {
        Self::NonFatalError {
            message: message.into(),
        }
    }

    /// Create an internal error without a cause
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an internal error keeping the original cause
    pub fn internal_with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::InternalError {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Original cause of an internal error
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::InternalError { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Whether the caller should re-supply credentials
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::LoginRequired | Self::InvalidCookies)
    }
}

/// Error returned by a collaborator's analysis step
///
/// The orchestrator maps every variant into exactly one `ExtractionError`.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Collaborator already knows the precise outcome
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Embedded JSON did not have the expected shape
    #[error("JSON parsing error")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transport(e) => e.is_transient() || matches!(e, TransportError::RateLimited { .. }),
            AppError::Manifest(ManifestError::Transport(e)) => e.is_transient(),
            AppError::Extraction(ExtractionError::NonFatalError { .. }) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "transport",
            AppError::Manifest(_) => "manifest",
            AppError::Config(_) => "config",
            AppError::Extraction(_) => "extraction",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transport result type alias
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Manifest result type alias
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Collaborator analysis result type alias
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transient = TransportError::Transient {
            url: "https://example.com".to_string(),
            reason: "connection reset".to_string(),
        };
        assert!(transient.is_transient());
        assert!(TransportError::Timeout { seconds: 13 }.is_transient());
        assert!(!TransportError::Cancelled.is_transient());
        assert!(!TransportError::UnexpectedStatus {
            url: "https://example.com".to_string(),
            status: 404
        }
        .is_transient());
    }

    #[test]
    fn test_internal_error_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let error = ExtractionError::internal_with_cause("analysis failed", io);

        let cause = error.cause().unwrap();
        assert_eq!(cause.to_string(), "disk on fire");
        assert_eq!(error.to_string(), "Internal error: analysis failed");

        let cloned = error.clone();
        assert!(cloned.cause().is_some());
    }

    #[test]
    fn test_app_error_category() {
        let app_error = AppError::from(ExtractionError::InvalidUrl);
        assert_eq!(app_error.category(), "extraction");
        assert!(!app_error.is_recoverable());

        let rate_limited = AppError::from(TransportError::RateLimited {
            url: "https://example.com".to_string(),
        });
        assert!(rate_limited.is_recoverable());
    }

    #[test]
    fn test_unsupported_reason_display() {
        let reason = UnsupportedReason::Encryption {
            method: "SAMPLE-AES".to_string(),
        };
        let error = ManifestError::NotDownloadable { reason };
        assert!(error.to_string().contains("SAMPLE-AES"));
        assert!(error.is_content_error());
    }
}
