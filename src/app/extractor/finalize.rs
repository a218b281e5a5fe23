//! Concurrent size enrichment and result assembly
//!
//! Every resource of every draft gets one size probe. Probes run
//! concurrently (bounded by `FinalizeConfig::max_concurrent_probes`) and a
//! finished probe immediately frees its slot for the next one. Each size is
//! written back by index, so result `i` always belongs to the URL that was
//! at position `i`, whatever order the probes completed in.
//! Resources that probe to 0 bytes are dropped, and drafts left with no
//! resources are dropped with them.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::app::models::{Formats, ManifestResource};
use crate::app::session::Session;
use crate::constants::finalize::MAX_CONCURRENT_PROBES;

/// Finalize settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeConfig {
    /// Cap on size probes in flight at once
    pub max_concurrent_probes: usize,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: MAX_CONCURRENT_PROBES,
        }
    }
}

/// What Finalize produced
#[derive(Debug, Clone, Default)]
pub struct FinalizeReport {
    /// Filtered formats in draft order
    pub formats: Vec<Formats>,
    pub probes_issued: usize,
    /// Probes that reported unknown or zero size
    pub probes_failed: usize,
}

/// Probe, filter and package `drafts`, then close the session
pub async fn finalize(session: &Session, drafts: Vec<Formats>, config: &FinalizeConfig) -> FinalizeReport {
    let urls: Vec<String> = drafts.iter().flat_map(probe_urls).collect();
    let probes_issued = urls.len();
    tracing::debug!("Probing {} resources across {} drafts", probes_issued, drafts.len());

    let mut sizes = vec![0_u64; probes_issued];
    let mut probes = stream::iter(urls.into_iter().enumerate())
        .map(|(index, url)| async move { (index, session.probe_size(&url).await.bytes()) })
        .buffer_unordered(config.max_concurrent_probes.max(1));
    while let Some((index, size)) = probes.next().await {
        sizes[index] = size;
    }
    let probes_failed = sizes.iter().filter(|size| **size == 0).count();

    let cookies = if session.policy().tracks_session_cookies {
        Some(session.observed_cookies().await)
    } else {
        None
    };

    let mut sizes = sizes.into_iter();
    let mut formats = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let mut kept = apply_sizes(draft, &mut sizes);
        if kept.is_empty() {
            tracing::debug!("Dropping draft {:?}: no downloadable resources", kept.title);
            continue;
        }
        if let Some(cookies) = &cookies {
            kept.cookies = cookies.clone();
        }
        formats.push(kept);
    }

    session.close();

    FinalizeReport {
        formats,
        probes_issued,
        probes_failed,
    }
}

/// Probe URLs of one draft in the order `apply_sizes` consumes them
fn probe_urls(draft: &Formats) -> Vec<String> {
    draft
        .video_data
        .iter()
        .map(|v| v.url.clone())
        .chain(draft.audio_data.iter().map(|a| a.url.clone()))
        .chain(draft.image_data.iter().map(|i| i.url.clone()))
        .chain(
            draft
                .manifest_data
                .iter()
                .flat_map(|m| m.segment_urls.iter().cloned()),
        )
        .collect()
}

/// Metadata copy of `draft` holding only resources with a confirmed size
fn apply_sizes(draft: Formats, sizes: &mut impl Iterator<Item = u64>) -> Formats {
    let mut kept = draft.metadata_only();
    kept.cookies = draft.cookies;

    let (videos, video_index) = keep_sized(draft.video_data, &mut *sizes, |v, size| v.byte_size = size);
    let (audios, audio_index) = keep_sized(draft.audio_data, &mut *sizes, |a, size| a.byte_size = size);
    let (images, image_index) = keep_sized(draft.image_data, &mut *sizes, |i, size| i.byte_size = size);

    kept.video_data = videos;
    kept.audio_data = audios;
    kept.image_data = images;
    kept.manifest_data = draft
        .manifest_data
        .into_iter()
        .filter_map(|group| size_group(group, &mut *sizes))
        .collect();

    // Carry a selection over only if the selected resource survived
    kept.selected_video_index = draft.selected_video_index.and_then(|i| video_index.get(i).copied().flatten());
    kept.selected_audio_index = draft.selected_audio_index.and_then(|i| audio_index.get(i).copied().flatten());
    kept.selected_thumbnail_index = draft
        .selected_thumbnail_index
        .and_then(|i| image_index.get(i).copied().flatten());

    kept
}

/// Keep items whose size is non-zero; also returns old index -> new index
fn keep_sized<T>(
    items: Vec<T>,
    sizes: &mut impl Iterator<Item = u64>,
    set_size: impl Fn(&mut T, u64),
) -> (Vec<T>, Vec<Option<usize>>) {
    let mut kept = Vec::with_capacity(items.len());
    let mut index = Vec::with_capacity(items.len());
    for mut item in items {
        let size = sizes.next().unwrap_or(0);
        if size > 0 {
            set_size(&mut item, size);
            index.push(Some(kept.len()));
            kept.push(item);
        } else {
            index.push(None);
        }
    }
    (kept, index)
}

/// Sum segment sizes; the grouping is dropped if any segment is empty
fn size_group(mut group: ManifestResource, sizes: &mut impl Iterator<Item = u64>) -> Option<ManifestResource> {
    let segment_sizes: Vec<u64> = group
        .segment_urls
        .iter()
        .map(|_| sizes.next().unwrap_or(0))
        .collect();
    if segment_sizes.is_empty() || segment_sizes.contains(&0) {
        return None;
    }
    group.byte_size = segment_sizes.iter().sum();
    Some(group)
}
