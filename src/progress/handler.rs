//! Progress handler trait and events

use crate::pipeline::Phase;
use crate::process::OutputStream;
use std::path::PathBuf;
use std::time::Duration;

/// Events emitted while a pipeline run advances
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A pipeline run started
    RunStarted { target: Phase, stages: usize },

    /// A stage is about to execute
    StageStarted { stage: String, phase: Phase },

    /// A stage reported itself complete and was skipped
    StageSkipped { stage: String, phase: Phase },

    /// A stage executed successfully
    StageCompleted {
        stage: String,
        phase: Phase,
        duration: Duration,
    },

    /// A stage failed and the run will abort
    StageFailed {
        stage: String,
        phase: Phase,
        error: String,
    },

    /// A stage entered a long-running background step
    StagePaused { stage: String },

    /// A paused stage resumed
    StageResumed { stage: String },

    /// All stages in a phase were marked stale
    PhaseInvalidated { phase: Phase },

    /// A line of output from a spawned build process
    ProcessOutput {
        stage: String,
        stream: OutputStream,
        line: String,
    },

    /// Progress while deleting a stale directory tree
    ReapProgress { path: PathBuf, removed: u64 },

    /// The run finished with every selected stage complete
    RunCompleted {
        executed: usize,
        skipped: usize,
        total_time: Duration,
    },

    /// The run aborted
    RunFailed { error: String },
}

/// Trait for handling progress events during a pipeline run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressEvent::RunStarted {
            target: Phase::Build,
            stages: 4,
        });
        // Should not panic or do anything
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::RunStarted {
            target: Phase::Export,
            stages: 6,
        });
        handler.on_progress(&ProgressEvent::StageCompleted {
            stage: "dependencies".to_string(),
            phase: Phase::Dependencies,
            duration: Duration::from_millis(50),
        });
        handler.on_progress(&ProgressEvent::RunCompleted {
            executed: 5,
            skipped: 1,
            total_time: Duration::from_secs(5),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::PhaseInvalidated {
            phase: Phase::Dependencies,
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("PhaseInvalidated"));
        assert!(debug_str.contains("Dependencies"));
    }
}
