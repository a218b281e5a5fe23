//! Collaborator registry
//!
//! Maps an input URL to the collaborator that handles it. Link shims are
//! unwrapped first, so a Facebook redirect to an Instagram post is handled by
//! the Instagram collaborator.

use std::fmt;
use std::sync::Arc;

use super::collaborator::Collaborator;
use super::hls::HlsCollaborator;
use crate::app::platform::{unwrap_link_shim, LinkShim, Platform};

/// Result of looking up a URL
#[derive(Clone)]
pub enum Lookup {
    /// Handled by `collaborator`; `url` is the input after shim unwrapping
    Found {
        collaborator: Arc<dyn Collaborator>,
        url: String,
    },
    /// Recognized platform without a registered collaborator
    Known(Platform),
    /// Not a supported site
    Unknown,
    /// A link shim whose target could not be recovered
    BrokenShim,
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { collaborator, url } => f
                .debug_struct("Found")
                .field("platform", &collaborator.platform())
                .field("url", url)
                .finish(),
            Self::Known(platform) => f.debug_tuple("Known").field(platform).finish(),
            Self::Unknown => f.write_str("Unknown"),
            Self::BrokenShim => f.write_str("BrokenShim"),
        }
    }
}

/// Ordered list of collaborators; the first match wins
#[derive(Clone, Default)]
pub struct Registry {
    collaborators: Vec<Arc<dyn Collaborator>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.collaborators.iter().map(|c| c.platform()))
            .finish()
    }
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in collaborators
    pub fn with_defaults() -> Self {
        Self::new().with(HlsCollaborator)
    }

    pub fn with(mut self, collaborator: impl Collaborator + 'static) -> Self {
        self.register(Arc::new(collaborator));
        self
    }

    pub fn register(&mut self, collaborator: Arc<dyn Collaborator>) {
        tracing::debug!("Registering collaborator for {}", collaborator.platform());
        self.collaborators.push(collaborator);
    }

    pub fn len(&self) -> usize {
        self.collaborators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }

    /// Find the collaborator for `url`
    pub fn find(&self, url: &str) -> Lookup {
        let url = match unwrap_link_shim(url.trim()) {
            LinkShim::NotShim => url.trim().to_string(),
            LinkShim::Target(target) => {
                tracing::debug!("Unwrapped link shim to {}", target);
                target
            }
            LinkShim::Unrecoverable => return Lookup::BrokenShim,
        };

        if let Some(collaborator) = self.collaborators.iter().find(|c| c.matches(&url)) {
            return Lookup::Found {
                collaborator: Arc::clone(collaborator),
                url,
            };
        }

        match Platform::detect(&url) {
            Some(platform) => Lookup::Known(platform),
            None => Lookup::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::app::extractor::collaborator::{AnalysisContext, AnalyzePayload};
    use crate::errors::AnalysisResult;

    struct Instagram;

    #[async_trait]
    impl Collaborator for Instagram {
        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn analyze(&self, _: &mut AnalysisContext<'_>, _: AnalyzePayload) -> AnalysisResult<()> {
            Ok(())
        }

        async fn test_webpage(&self, _: &mut AnalysisContext<'_>, _: &str) -> AnalysisResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lookup_outcomes() {
        let registry = Registry::with_defaults().with(Instagram);
        assert_eq!(registry.len(), 2);

        match registry.find("https://cdn.example.com/live/master.m3u8") {
            Lookup::Found { collaborator, .. } => assert_eq!(collaborator.platform(), Platform::Hls),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            registry.find("https://vimeo.com/12345"),
            Lookup::Known(Platform::Vimeo)
        ));
        assert!(matches!(registry.find("https://example.com/watch"), Lookup::Unknown));
    }

    #[test]
    fn test_link_shim_is_unwrapped_before_matching() {
        let registry = Registry::new().with(Instagram);
        let shim = "https://l.facebook.com/l.php?u=https%3A%2F%2Fwww.instagram.com%2Fp%2FCn7%2F&h=AT0";

        match registry.find(shim) {
            Lookup::Found { collaborator, url } => {
                assert_eq!(collaborator.platform(), Platform::Instagram);
                assert_eq!(url, "https://www.instagram.com/p/Cn7/");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            registry.find("https://facebook.com/share?x=instagram.com"),
            Lookup::BrokenShim
        ));
    }
}
