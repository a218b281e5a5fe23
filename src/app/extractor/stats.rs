//! Per-attempt extraction statistics

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Counters collected over one extraction attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// Wall time from start to the terminal event
    pub duration: Duration,
    /// Drafts produced by the collaborator
    pub drafts: usize,
    /// Size probes issued by Finalize
    pub probes_issued: usize,
    /// Probes that came back unknown or empty
    pub probes_failed: usize,
    /// Formats delivered in the terminal Success
    pub formats_kept: usize,
    /// Middle progress events forwarded from the collaborator
    pub progress_events: usize,
}

impl Default for ExtractionStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            duration: Duration::ZERO,
            drafts: 0,
            probes_issued: 0,
            probes_failed: 0,
            formats_kept: 0,
            progress_events: 0,
        }
    }
}

impl ExtractionStats {
    /// Stamp the duration
    pub fn finish(&mut self) {
        self.duration = (Utc::now() - self.started_at).to_std().unwrap_or_default();
    }

    /// Share of probes that confirmed a downloadable resource
    pub fn probe_success_rate(&self) -> f64 {
        if self.probes_issued == 0 {
            return 0.0;
        }
        let confirmed = self.probes_issued.saturating_sub(self.probes_failed);
        (confirmed as f64 / self.probes_issued as f64) * 100.0
    }

    pub fn log_summary(&self, url: &str) {
        info!(
            "Extraction of {} finished in {:.2}s: {} drafts, {}/{} probes confirmed, {} formats kept",
            url,
            self.duration.as_secs_f64(),
            self.drafts,
            self.probes_issued.saturating_sub(self.probes_failed),
            self.probes_issued,
            self.formats_kept
        );
    }
}
