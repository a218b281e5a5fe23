//! Recursive playlist resolution over a session
//!
//! A master playlist is expanded into one `ManifestResource` per variant, in
//! document order. Variant playlists that are themselves masters are expanded
//! again, down to a fixed depth.

use futures::future::{try_join_all, BoxFuture, FutureExt};
use url::Url;

use super::parser::{self, Playlist, Variant};
use crate::app::models::ManifestResource;
use crate::app::session::Session;
use crate::constants::manifest::{MAX_NESTING_DEPTH, UNKNOWN_QUALITY};
use crate::errors::{ManifestError, ManifestResult, TransportError};

/// Fetch the playlist at `url` and resolve it into segment groupings
pub async fn resolve(session: &Session, url: &str) -> ManifestResult<Vec<ManifestResource>> {
    let base = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let document = fetch_document(session, url).await?;
    resolve_at_depth(session, document, base, UNKNOWN_QUALITY.to_string(), 0).await
}

/// Resolve an already fetched playlist; nested playlists are still fetched
pub async fn resolve_document(
    session: &Session,
    document: &str,
    base: &Url,
) -> ManifestResult<Vec<ManifestResource>> {
    resolve_at_depth(
        session,
        document.to_string(),
        base.clone(),
        UNKNOWN_QUALITY.to_string(),
        0,
    )
    .await
}

fn resolve_at_depth(
    session: &Session,
    document: String,
    base: Url,
    quality: String,
    depth: usize,
) -> BoxFuture<'_, ManifestResult<Vec<ManifestResource>>> {
    async move {
        match parser::parse(&document, &base)? {
            Playlist::Media(media) => Ok(vec![ManifestResource::new(quality, media.segments)]),
            Playlist::Master(variants) => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(ManifestError::TooDeep {
                        depth: MAX_NESTING_DEPTH,
                    });
                }

                let parent = base.to_string();
                let nested = variants.into_iter().map(move |variant| {
                    let Variant {
                        quality: inner,
                        uri,
                        ..
                    } = variant;
                    // An inner label wins over the outer one
                    let quality = if inner == UNKNOWN_QUALITY {
                        quality.clone()
                    } else {
                        inner
                    };
                    let parent = parent.clone();
                    async move {
                        let base = Url::parse(&uri).map_err(|_| ManifestError::InvalidReference {
                            base: parent,
                            reference: uri.clone(),
                        })?;
                        let document = fetch_document(session, &uri).await?;
                        resolve_at_depth(session, document, base, quality, depth + 1).await
                    }
                });

                let groups = try_join_all(nested).await?;
                Ok(groups.into_iter().flatten().collect())
            }
        }
    }
    .boxed()
}

async fn fetch_document(session: &Session, url: &str) -> ManifestResult<String> {
    match session.get(url).await?.into_body() {
        Some(document) => Ok(document),
        None => Err(ManifestError::Unreachable {
            url: url.to_string(),
        }),
    }
}
