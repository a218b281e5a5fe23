//! Application constants for vidsnap
//!
//! This module centralizes all constants used throughout the crate,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Log filter override (same syntax as `RUST_LOG`)
    pub const LOG_FILTER: &str = "VIDSNAP_LOG";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

    /// Default HTTP request timeout for the shared client
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(13);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;

    /// Maximum number of redirect hops chased for a single exchange
    pub const MAX_REDIRECTS: usize = 20;

    /// Statuses counted as "page is available" by the reachability probe
    pub const AVAILABLE_STATUSES: [u16; 8] = [200, 201, 202, 203, 204, 205, 206, 207];

    /// Statuses that carry a `Location` worth chasing
    pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

    /// Longest body excerpt written to logs for unclassified responses
    pub const LOG_BODY_EXCERPT: usize = 2000;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for the shared exchange (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;

    /// Maximum retry attempts for transient transport faults
    pub const MAX_RETRIES: u32 = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 250;

    /// Upper bound of random jitter added to each backoff (milliseconds)
    pub const RETRY_JITTER_MS: u64 = 100;
}

/// Per-attempt session policy
pub mod session {
    use super::Duration;

    /// Hard bound applied to every network phase regardless of client config
    pub const PHASE_TIMEOUT: Duration = Duration::from_secs(13);

    /// Header carrying caller credentials
    pub const COOKIE_HEADER: &str = "Cookie";

    /// Header carrying the user agent
    pub const USER_AGENT_HEADER: &str = "User-Agent";
}

/// Finalize (size enrichment) settings
pub mod finalize {
    /// Default cap on concurrently running size probes
    pub const MAX_CONCURRENT_PROBES: usize = 32;
}

/// Streaming-playlist markers
pub mod manifest {
    /// Present only in media playlists
    pub const TARGET_DURATION_TAG: &str = "#EXT-X-TARGETDURATION";

    /// Adobe Flash Access protection
    pub const FLASH_ACCESS_TAG: &str = "#EXT-X-FAXS-CM:";

    /// Session key tag (FairPlay when the URI uses `skd://`)
    pub const SESSION_KEY_TAG: &str = "#EXT-X-SESSION-KEY:";

    /// Segment encryption tag
    pub const KEY_TAG: &str = "#EXT-X-KEY:";

    /// Initialization section tag
    pub const MAP_TAG: &str = "#EXT-X-MAP:";

    /// Byte-range addressed segments
    pub const BYTE_RANGE_TAG: &str = "#EXT-X-BYTERANGE";

    /// Variant stream descriptor in master playlists
    pub const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";

    /// Anvato ad marker prefix
    pub const ANVATO_SEGMENT_INFO: &str = "#ANVATO-SEGMENT-INFO";

    /// Uplynk ad marker prefix
    pub const UPLYNK_SEGMENT: &str = "#UPLYNK-SEGMENT";

    /// Maximum nesting of master playlists followed by the resolver
    pub const MAX_NESTING_DEPTH: usize = 3;

    /// Label used when a variant has no resolution attribute
    pub const UNKNOWN_QUALITY: &str = "--";

    /// Title used when nothing better is known
    pub const DEFAULT_TITLE: &str = "Stream_video";
}

/// MIME types attached to extracted resources
pub mod mime {
    pub const VIDEO_MP4: &str = "video/mp4";
    pub const VIDEO_WEBM: &str = "video/webm";
    pub const AUDIO_MP4: &str = "audio/mp4";
    pub const AUDIO_WEBM: &str = "audio/webm";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const APPLICATION_MPEG_URL: &str = "application/x-mpegURL";
}

/// Platform-specific values
pub mod platform {
    /// Mobile app user agent that Instagram serves full post data to
    pub const INSTAGRAM_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 12_3_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Instagram 105.0.0.11.118 (iPhone11,8; iOS 12_3_1; en_US; en-US; scale=2.00; 828x1792; 165586599)";
}

// Re-export commonly used constants for convenience
pub use http::{MAX_REDIRECTS, USER_AGENT};
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_RETRIES};
pub use session::PHASE_TIMEOUT;
