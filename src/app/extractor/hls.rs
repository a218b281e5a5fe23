//! Built-in collaborator for direct HLS playlist links

use async_trait::async_trait;
use url::Url;

use super::collaborator::{AnalysisContext, AnalyzePayload, Collaborator};
use crate::app::manifest;
use crate::app::models::{Formats, ManifestResource};
use crate::app::platform::Platform;
use crate::app::util::filter_title;
use crate::constants::manifest::DEFAULT_TITLE;
use crate::errors::{AnalysisResult, ExtractionError, ManifestError, TransportError};

/// Resolves `.m3u8` links into one `Formats` with a grouping per variant
#[derive(Debug, Clone, Copy, Default)]
pub struct HlsCollaborator;

impl HlsCollaborator {
    fn package(
        ctx: &mut AnalysisContext<'_>,
        title: String,
        groupings: Vec<ManifestResource>,
    ) {
        if groupings.is_empty() {
            ctx.fail(ExtractionError::non_fatal("Playlist has no media segments"));
            return;
        }

        tracing::debug!("Resolved {} stream variants for {}", groupings.len(), ctx.input_url());
        let mut draft = Formats::new(title, ctx.input_url(), Platform::Hls.tag());
        draft.manifest_data = groupings;
        ctx.push_draft(draft);
    }
}

#[async_trait]
impl Collaborator for HlsCollaborator {
    fn platform(&self) -> Platform {
        Platform::Hls
    }

    async fn analyze(&self, ctx: &mut AnalysisContext<'_>, payload: AnalyzePayload) -> AnalysisResult<()> {
        if payload.flag("is_live") {
            return Err(ManifestError::LiveStream.into());
        }

        ctx.progress();
        let url = ctx.input_url().to_string();
        let groupings = manifest::resolve(ctx.session(), &url).await?;
        ctx.progress();

        let title = title_for(&url, payload.text("title"));
        Self::package(ctx, title, groupings);
        Ok(())
    }

    async fn test_webpage(&self, ctx: &mut AnalysisContext<'_>, document: &str) -> AnalysisResult<()> {
        let url = ctx.input_url().to_string();
        let base = Url::parse(&url).map_err(|e| TransportError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        ctx.progress();
        let groupings = manifest::resolve_document(ctx.session(), document, &base).await?;
        Self::package(ctx, title_for(&url, None), groupings);
        Ok(())
    }
}

/// Caller title, else the playlist file stem, else the default
fn title_for(url: &str, supplied: Option<&str>) -> String {
    if let Some(title) = supplied.map(filter_title).filter(|t| !t.trim().is_empty()) {
        return title;
    }

    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|file| {
            let stem = file.strip_suffix(".m3u8").unwrap_or(&file);
            filter_title(stem)
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}
