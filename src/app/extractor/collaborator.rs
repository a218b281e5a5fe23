//! Site-specific extraction capability
//!
//! A [`Collaborator`] knows how to turn one platform's pages into `Formats`
//! drafts. It receives an [`AnalysisContext`] giving it the attempt's session
//! and a way to report progress, drafts and failures; everything else
//! (probing, size confirmation, terminal events) stays with the orchestrator.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::events::EventEmitter;
use crate::app::models::Formats;
use crate::app::platform::Platform;
use crate::app::session::Session;
use crate::errors::{AnalysisResult, ExtractionError};

/// Input handed to `Collaborator::analyze`
#[derive(Debug, Clone, Default)]
pub struct AnalyzePayload {
    /// The reachability probe failed but credentials allowed analysis anyway
    pub forced: bool,
    /// Caller-supplied extras (for example `title` or `is_live`)
    pub extras: HashMap<String, Value>,
}

impl AnalyzePayload {
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.extras.get(key).and_then(Value::as_str)
    }

    /// Boolean extra, false when absent or not a boolean
    pub fn flag(&self, key: &str) -> bool {
        self.extras
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// What a collaborator can see and do during one analysis
pub struct AnalysisContext<'a> {
    session: &'a Session,
    emitter: &'a EventEmitter,
    drafts: Vec<Formats>,
    failure: Option<ExtractionError>,
}

impl<'a> AnalysisContext<'a> {
    pub(crate) fn new(session: &'a Session, emitter: &'a EventEmitter) -> Self {
        Self {
            session,
            emitter,
            drafts: Vec::new(),
            failure: None,
        }
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    /// Normalized input URL of the attempt
    pub fn input_url(&self) -> &'a str {
        self.session.input_url()
    }

    /// Report intermediate progress
    pub fn progress(&self) {
        self.emitter.middle();
    }

    /// Hand a draft to Finalize
    pub fn push_draft(&mut self, draft: Formats) {
        self.drafts.push(draft);
    }

    pub fn drafts(&self) -> &[Formats] {
        &self.drafts
    }

    /// Record a terminal failure; the first one recorded wins
    pub fn fail(&mut self, error: ExtractionError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        } else {
            tracing::debug!("Ignoring later failure: {}", error);
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub(crate) fn into_parts(self) -> (Vec<Formats>, Option<ExtractionError>) {
        (self.drafts, self.failure)
    }
}

/// Site-specific extractor
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Platform this collaborator handles
    fn platform(&self) -> Platform;

    /// Whether this collaborator handles `url`
    fn matches(&self, url: &str) -> bool {
        Platform::detect(url) == Some(self.platform())
    }

    /// Rewrite the input URL before probing
    fn normalize_url(&self, url: &str, has_credentials: bool) -> String {
        self.platform().normalize_url(url, has_credentials)
    }

    /// Fetch and parse the platform's data, pushing drafts into `ctx`
    async fn analyze(&self, ctx: &mut AnalysisContext<'_>, payload: AnalyzePayload) -> AnalysisResult<()>;

    /// Feed a captured document through the same parsing path as `analyze`
    async fn test_webpage(&self, ctx: &mut AnalysisContext<'_>, document: &str) -> AnalysisResult<()>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_payload_accessors() {
        let payload = AnalyzePayload::default()
            .with_extra("title", "Launch")
            .with_extra("is_live", true)
            .with_extra("count", json!(3));

        assert_eq!(payload.text("title"), Some("Launch"));
        assert!(payload.flag("is_live"));
        assert!(!payload.flag("title"));
        assert!(!payload.flag("missing"));
        assert_eq!(payload.extra("count"), Some(&json!(3)));
        assert!(!payload.forced);
    }
}
