//! Platform recognition and per-platform transport policy
//!
//! Some upstream servers behave in undocumented ways that the transport and
//! orchestrator must account for. Those quirks are listed here, one platform
//! at a time, instead of being generalized:
//!
//! | Platform  | 500 = bad cookies | forceable | 4xx = post 404 | keeps cookies | user agent |
//! |-----------|-------------------|-----------|----------------|---------------|------------|
//! | Instagram | yes               | yes       | yes            | no            | mobile app |
//! | Facebook  | no                | yes       | no             | no            | default    |
//! | TikTok    | no                | no        | no             | yes           | default    |
//! | others    | no                | no        | no             | no            | default    |
//!
//! Instagram answers 500 instead of 401/403 when it receives stale cookies, so
//! a 500 from Instagram is read as "credentials rejected" and as "the page
//! exists" by the reachability probe.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::platform::INSTAGRAM_USER_AGENT;

/// Site family an input URL belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Facebook,
    Instagram,
    LinkedIn,
    ShareChat,
    DailyMotion,
    Vimeo,
    Likee,
    Twitter,
    TikTok,
    Twitch,
    Snapchat,
    Periscope,
    /// Direct link to an HLS playlist
    Hls,
}

/// Explicit quirks of one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformPolicy {
    /// A 500 response means the supplied cookies were rejected
    pub server_error_means_invalid_credentials: bool,
    /// Analysis may proceed with `forced = true` when the probe fails but
    /// credentials were supplied
    pub forceable_with_credentials: bool,
    /// Client errors during analysis mean "post not found" on this platform
    pub reports_platform_404: bool,
    /// Downloads need the cookies observed during extraction
    pub tracks_session_cookies: bool,
    /// User agent the platform must see
    pub user_agent: Option<&'static str>,
}

const DEFAULT_POLICY: PlatformPolicy = PlatformPolicy {
    server_error_means_invalid_credentials: false,
    forceable_with_credentials: false,
    reports_platform_404: false,
    tracks_session_cookies: false,
    user_agent: None,
};

impl Default for PlatformPolicy {
    fn default() -> Self {
        DEFAULT_POLICY
    }
}

impl Platform {
    /// Recognize the platform of a raw input URL
    pub fn detect(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        // Order matters: a Facebook link shim may carry an Instagram URL.
        if lower.contains("facebook") || lower.contains("fb.") {
            Some(Self::Facebook)
        } else if lower.contains("instagram") {
            Some(Self::Instagram)
        } else if lower.contains("linkedin") {
            Some(Self::LinkedIn)
        } else if lower.contains("sharechat") {
            Some(Self::ShareChat)
        } else if lower.contains("dailymotion") || lower.contains("dai.ly") {
            Some(Self::DailyMotion)
        } else if lower.contains("vimeo") {
            Some(Self::Vimeo)
        } else if lower.contains("likee") {
            Some(Self::Likee)
        } else if lower.contains("twitter") {
            Some(Self::Twitter)
        } else if lower.contains("tiktok.com") {
            Some(Self::TikTok)
        } else if lower.contains("twitch.tv") {
            Some(Self::Twitch)
        } else if lower.contains("snapchat.com") {
            Some(Self::Snapchat)
        } else if lower.contains("periscope.tv") || lower.contains("pscp.tv") {
            Some(Self::Periscope)
        } else if is_hls_url(&lower) {
            Some(Self::Hls)
        } else {
            None
        }
    }

    /// Platform of an already parsed URL, judged by host
    pub fn for_url(url: &Url) -> Option<Self> {
        url.host_str().and_then(Self::detect)
    }

    /// Tag stored in `Formats::platform_tag`
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::LinkedIn => "LinkedIn",
            Self::ShareChat => "ShareChat",
            Self::DailyMotion => "DailyMotion",
            Self::Vimeo => "Vimeo",
            Self::Likee => "Likee",
            Self::Twitter => "Twitter",
            Self::TikTok => "TikTok",
            Self::Twitch => "Twitch",
            Self::Snapchat => "Snapchat",
            Self::Periscope => "Periscope",
            Self::Hls => "HLS",
        }
    }

    pub fn policy(&self) -> PlatformPolicy {
        match self {
            Self::Instagram => PlatformPolicy {
                server_error_means_invalid_credentials: true,
                forceable_with_credentials: true,
                reports_platform_404: true,
                user_agent: Some(INSTAGRAM_USER_AGENT),
                ..DEFAULT_POLICY
            },
            Self::Facebook => PlatformPolicy {
                forceable_with_credentials: true,
                ..DEFAULT_POLICY
            },
            Self::TikTok => PlatformPolicy {
                tracks_session_cookies: true,
                ..DEFAULT_POLICY
            },
            _ => DEFAULT_POLICY,
        }
    }

    /// Rewrite the input URL into the form the platform serves best
    ///
    /// Instagram serves reels anonymously under `/reel/` but needs `/reels/`
    /// once a logged-in cookie is attached.
    pub fn normalize_url(&self, url: &str, has_credentials: bool) -> String {
        match self {
            Self::Instagram if has_credentials => url.replace("/reel/", "/reels/"),
            Self::Instagram => url.replace("/reels/", "/reel/"),
            _ => url.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Policy for a URL, default when the platform is unknown
pub fn policy_for(url: &Url) -> PlatformPolicy {
    Platform::for_url(url)
        .map(|p| p.policy())
        .unwrap_or_default()
}

fn is_hls_url(lower: &str) -> bool {
    let path = lower.split(['?', '#']).next().unwrap_or(lower);
    path.ends_with(".m3u8")
}

fn shim_target_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\?.*?u=(.*?)&").expect("Link shim pattern should be valid"))
}

/// Result of inspecting an input URL for a Facebook link shim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkShim {
    /// Not a shim; use the URL as-is
    NotShim,
    /// Shim pointing at this target
    Target(String),
    /// Looks like a shim but the target cannot be recovered
    Unrecoverable,
}

/// Unwrap a Facebook link shim pointing at an Instagram post
pub fn unwrap_link_shim(url: &str) -> LinkShim {
    let lower = url.to_ascii_lowercase();
    if !(lower.contains("facebook") || lower.contains("fb.")) || !lower.contains("instagram.com") {
        return LinkShim::NotShim;
    }

    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, target)) = parsed.query_pairs().find(|(key, _)| key == "u") {
            return LinkShim::Target(target.into_owned());
        }
    }

    // Query string may be mangled; fall back to a pattern match.
    let captured = shim_target_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| crate::app::util::decode_url(m.as_str()));
    match captured {
        Some(target) => LinkShim::Target(target),
        None => LinkShim::Unrecoverable,
    }
}
