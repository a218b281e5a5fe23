//! Data models for vidsnap
//!
//! This module defines the media description produced by an extraction
//! attempt (`Formats` and its resources) and the events that flow from the
//! orchestrator to the caller.

use serde::{Deserialize, Serialize};

use crate::constants::{manifest, mime};
use crate::errors::ExtractionError;

/// Placeholder used when a quality or resolution label is unknown
pub const UNKNOWN_QUALITY: &str = manifest::UNKNOWN_QUALITY;

/// One downloadable video rendition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResource {
    pub url: String,
    pub mime_type: String,
    /// Quality label such as `1280x720` or `720p`
    pub quality: String,
    /// Confirmed size in bytes; 0 until Finalize probes it
    pub byte_size: u64,
    /// Whether the rendition carries its own audio track
    pub has_audio: bool,
}

impl VideoResource {
    /// Create a resource with an unknown size that carries audio
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>, quality: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
            quality: quality.into(),
            byte_size: 0,
            has_audio: true,
        }
    }

    /// Mark the rendition as video-only
    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }
}

/// One downloadable audio rendition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioResource {
    pub url: String,
    pub mime_type: String,
    pub quality: String,
    pub byte_size: u64,
}

impl AudioResource {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
            quality: UNKNOWN_QUALITY.to_string(),
            byte_size: 0,
        }
    }
}

/// One downloadable image (thumbnail or carousel entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResource {
    pub url: String,
    pub mime_type: String,
    pub resolution: String,
    pub byte_size: u64,
}

impl ImageResource {
    /// JPEG image with unknown resolution
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime::IMAGE_JPEG.to_string(),
            resolution: UNKNOWN_QUALITY.to_string(),
            byte_size: 0,
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }
}

/// A segmented stream: one playlist variant resolved to its media segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestResource {
    /// Resolution label from the master playlist, `--` when absent
    pub quality: String,
    pub mime_type: String,
    /// Segment URLs in playback order
    pub segment_urls: Vec<String>,
    /// Sum of all segment sizes; 0 until Finalize confirms every segment
    pub byte_size: u64,
}

impl ManifestResource {
    pub fn new(quality: impl Into<String>, segment_urls: Vec<String>) -> Self {
        Self {
            quality: quality.into(),
            mime_type: mime::VIDEO_MP4.to_string(),
            segment_urls,
            byte_size: 0,
        }
    }
}

/// Cookie observed during an extraction session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Host the cookie was received from
    pub domain: String,
}

impl Cookie {
    /// Parse the leading `name=value` pair of a `Set-Cookie` header
    pub fn parse_set_cookie(header: &str, domain: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: domain.to_string(),
        })
    }
}

/// One extracted media post
///
/// A single attempt may yield several of these (carousel entries, separate
/// posts of a thread). Drafts are mutable while a collaborator builds them;
/// the copies delivered in a terminal `Success` are final.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formats {
    pub title: String,
    /// URL the user supplied (after platform normalization)
    pub source_url: String,
    /// Platform tag such as `Instagram`
    pub platform_tag: String,
    pub video_data: Vec<VideoResource>,
    pub audio_data: Vec<AudioResource>,
    pub image_data: Vec<ImageResource>,
    pub manifest_data: Vec<ManifestResource>,
    /// Session cookies needed to download the resources
    pub cookies: Vec<Cookie>,
    pub selected_video_index: Option<usize>,
    pub selected_audio_index: Option<usize>,
    pub selected_thumbnail_index: Option<usize>,
}

impl Formats {
    /// Create an empty draft carrying only metadata
    pub fn new(
        title: impl Into<String>,
        source_url: impl Into<String>,
        platform_tag: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            platform_tag: platform_tag.into(),
            ..Default::default()
        }
    }

    /// Copy of the metadata fields with every resource list empty
    pub fn metadata_only(&self) -> Self {
        Self::new(
            self.title.clone(),
            self.source_url.clone(),
            self.platform_tag.clone(),
        )
    }

    /// True when no resource list has an entry
    pub fn is_empty(&self) -> bool {
        self.video_data.is_empty()
            && self.audio_data.is_empty()
            && self.image_data.is_empty()
            && self.manifest_data.is_empty()
    }

    /// Total number of size probes Finalize issues for this draft
    pub fn probe_count(&self) -> usize {
        self.video_data.len()
            + self.audio_data.len()
            + self.image_data.len()
            + self
                .manifest_data
                .iter()
                .map(|m| m.segment_urls.len())
                .sum::<usize>()
    }

    /// Selected video index, 0 when nothing was selected
    pub fn selected_video_index(&self) -> usize {
        self.selected_video_index.unwrap_or(0)
    }

    pub fn selected_audio_index(&self) -> usize {
        self.selected_audio_index.unwrap_or(0)
    }

    pub fn selected_thumbnail_index(&self) -> usize {
        self.selected_thumbnail_index.unwrap_or(0)
    }

    /// Selected video, `None` when the list is empty
    pub fn selected_video(&self) -> Option<&VideoResource> {
        self.video_data.get(self.selected_video_index())
    }

    pub fn selected_audio(&self) -> Option<&AudioResource> {
        self.audio_data.get(self.selected_audio_index())
    }

    pub fn selected_thumbnail(&self) -> Option<&ImageResource> {
        self.image_data.get(self.selected_thumbnail_index())
    }

    /// Select a video rendition; out-of-range indices are rejected
    pub fn select_video(&mut self, index: usize) -> bool {
        if index < self.video_data.len() {
            self.selected_video_index = Some(index);
            true
        } else {
            false
        }
    }

    pub fn select_audio(&mut self, index: usize) -> bool {
        if index < self.audio_data.len() {
            self.selected_audio_index = Some(index);
            true
        } else {
            false
        }
    }

    pub fn select_thumbnail(&mut self, index: usize) -> bool {
        if index < self.image_data.len() {
            self.selected_thumbnail_index = Some(index);
            true
        } else {
            false
        }
    }
}

/// Informational lifecycle marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProgressState {
    Start,
    Middle,
    End,
}

/// Terminal result of one extraction attempt
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Vec<Formats>),
    Failed(ExtractionError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Formats of a successful attempt
    pub fn formats(&self) -> Option<&[Formats]> {
        match self {
            Self::Success(formats) => Some(formats),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExtractionError> {
        match self {
            Self::Success(_) => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// Event delivered to the caller's progress channel
#[derive(Debug, Clone)]
pub enum ExtractionEvent {
    Progress(ProgressState),
    Success(Vec<Formats>),
    Failed(ExtractionError),
}

impl ExtractionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

impl From<Outcome> for ExtractionEvent {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(formats) => Self::Success(formats),
            Outcome::Failed(error) => Self::Failed(error),
        }
    }
}

/// Map a codec string to a MIME type, falling back to `default`
pub fn mime_from_codecs(codecs: &str, default: &str) -> String {
    let codecs = codecs.to_ascii_lowercase();
    let mime = if codecs.contains("mp4a") {
        mime::AUDIO_MP4
    } else if codecs.contains("opus") {
        mime::AUDIO_WEBM
    } else if codecs.contains("avc") {
        mime::VIDEO_MP4
    } else if codecs.contains("vp8") || codecs.contains("vp9") {
        mime::VIDEO_WEBM
    } else {
        tracing::debug!("Unable to find mime type from codec {}", codecs);
        default
    };
    mime.to_string()
}
