//! Progress reporting for long-running scans
//!
//! Backups report one `reading` event per document; restores report one
//! `writing` or `deleting` event per committed batch. Reporters are called
//! synchronously between store calls.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stage of a backup or restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Reading,
    Writing,
    Deleting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Reading => write!(f, "reading"),
            Phase::Writing => write!(f, "writing"),
            Phase::Deleting => write!(f, "deleting"),
        }
    }
}

/// A single progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub collection: String,
    pub current: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn new(phase: Phase, collection: &str, current: usize, total: usize) -> Self {
        Self {
            phase,
            collection: collection.to_string(),
            current,
            total,
        }
    }
}

/// Receiver of progress events
pub trait ProgressReporter {
    fn report(&mut self, event: &ProgressEvent);
}

impl<F> ProgressReporter for F
where
    F: FnMut(&ProgressEvent),
{
    fn report(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Collects every event, handy for tests and post-run summaries
impl ProgressReporter for Vec<ProgressEvent> {
    fn report(&mut self, event: &ProgressEvent) {
        self.push(event.clone());
    }
}

/// Optional reporter threaded through a backup or restore run
pub(crate) struct Progress<'a> {
    reporter: Option<&'a mut dyn ProgressReporter>,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(reporter: Option<&'a mut dyn ProgressReporter>) -> Self {
        Self { reporter }
    }

    pub(crate) fn emit(&mut self, phase: Phase, collection: &str, current: usize, total: usize) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.report(&ProgressEvent::new(phase, collection, current, total));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_reporter() {
        let mut seen = Vec::new();
        let mut closure = |event: &ProgressEvent| seen.push(event.current);
        {
            let mut progress = Progress::new(Some(&mut closure));
            progress.emit(Phase::Writing, "obras", 400, 900);
            progress.emit(Phase::Writing, "obras", 800, 900);
        }
        assert_eq!(seen, vec![400, 800]);
    }

    #[test]
    fn test_vec_reporter_and_silent_progress() {
        let mut events: Vec<ProgressEvent> = Vec::new();
        Progress::new(Some(&mut events)).emit(Phase::Deleting, "users", 1, 1);
        assert_eq!(events, vec![ProgressEvent::new(Phase::Deleting, "users", 1, 1)]);

        // no reporter, nothing to do
        Progress::new(None).emit(Phase::Reading, "users", 1, 1);
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        let event = ProgressEvent::new(Phase::Reading, "pagos", 3, 10);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"phase":"reading","collection":"pagos","current":3,"total":10}"#
        );
    }
}
