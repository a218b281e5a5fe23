//! Ordered event delivery to the caller
//!
//! The emitter enforces the lifecycle order on everything sent to the
//! caller's channel: one `Start`, any number of `Middle`, at most one `End`,
//! then exactly one terminal event. Out-of-order emissions are dropped, so a
//! collaborator can never produce a second terminal event or a late `Middle`.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use tokio::sync::mpsc::UnboundedSender;

use crate::app::models::{ExtractionEvent, Outcome, ProgressState};

const IDLE: u8 = 0;
const STARTED: u8 = 1;
const ENDED: u8 = 2;
const TERMINATED: u8 = 3;

/// Lifecycle-ordered sender of `ExtractionEvent`s
#[derive(Debug)]
pub struct EventEmitter {
    sender: UnboundedSender<ExtractionEvent>,
    stage: AtomicU8,
    middles: AtomicUsize,
}

impl EventEmitter {
    pub fn new(sender: UnboundedSender<ExtractionEvent>) -> Self {
        Self {
            sender,
            stage: AtomicU8::new(IDLE),
            middles: AtomicUsize::new(0),
        }
    }

    /// Emit `Start`; only the first call has an effect
    pub fn start(&self) -> bool {
        self.advance(IDLE, STARTED) && self.send(ExtractionEvent::Progress(ProgressState::Start))
    }

    /// Emit `Middle` between `Start` and `End`
    pub fn middle(&self) -> bool {
        if self.stage.load(Ordering::SeqCst) != STARTED {
            tracing::debug!("Dropping out-of-order progress event");
            return false;
        }
        self.middles.fetch_add(1, Ordering::SeqCst);
        self.send(ExtractionEvent::Progress(ProgressState::Middle))
    }

    /// Emit `End` once, right before Finalize
    pub fn end(&self) -> bool {
        self.advance(STARTED, ENDED) && self.send(ExtractionEvent::Progress(ProgressState::End))
    }

    /// Emit the terminal event; every later call is ignored
    pub fn finish(&self, outcome: &Outcome) -> bool {
        if self.stage.swap(TERMINATED, Ordering::SeqCst) == TERMINATED {
            tracing::warn!("Suppressing second terminal event");
            return false;
        }
        self.send(ExtractionEvent::from(outcome.clone()))
    }

    pub fn is_finished(&self) -> bool {
        self.stage.load(Ordering::SeqCst) == TERMINATED
    }

    /// Number of `Middle` events sent so far
    pub fn middle_count(&self) -> usize {
        self.middles.load(Ordering::SeqCst)
    }

    fn advance(&self, from: u8, to: u8) -> bool {
        self.stage
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn send(&self, event: ExtractionEvent) -> bool {
        // A caller that dropped its receiver no longer cares
        if self.sender.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
        true
    }
}
