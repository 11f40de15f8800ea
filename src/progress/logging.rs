//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use crate::process::OutputStream;
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { target, stages } => {
                info!(target_phase = %target, stages, "Starting pipeline run");
            }
            ProgressEvent::StageStarted { stage, phase } => {
                info!(stage = %stage, phase = %phase, "Executing stage");
            }
            ProgressEvent::StageSkipped { stage, phase } => {
                debug!(stage = %stage, phase = %phase, "Stage already complete, skipping");
            }
            ProgressEvent::StageCompleted {
                stage,
                phase,
                duration,
            } => {
                info!(
                    stage = %stage,
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Stage complete"
                );
            }
            ProgressEvent::StageFailed {
                stage,
                phase,
                error,
            } => {
                warn!(stage = %stage, phase = %phase, error = %error, "Stage failed");
            }
            ProgressEvent::StagePaused { stage } => {
                debug!(stage = %stage, "Stage paused");
            }
            ProgressEvent::StageResumed { stage } => {
                debug!(stage = %stage, "Stage resumed");
            }
            ProgressEvent::PhaseInvalidated { phase } => {
                info!(phase = %phase, "Phase invalidated, stages will re-run");
            }
            ProgressEvent::ProcessOutput {
                stage,
                stream,
                line,
            } => match stream {
                OutputStream::Stdout => debug!(stage = %stage, "{}", line),
                OutputStream::Stderr => debug!(stage = %stage, "[stderr] {}", line),
            },
            ProgressEvent::ReapProgress { path, removed } => {
                debug!(path = %path.display(), removed, "Removing stale build directory");
            }
            ProgressEvent::RunCompleted {
                executed,
                skipped,
                total_time,
            } => {
                info!(
                    executed,
                    skipped,
                    total_time_ms = total_time.as_millis(),
                    "Pipeline run complete"
                );
            }
            ProgressEvent::RunFailed { error } => {
                warn!(error = %error, "Pipeline run failed");
            }
        }
    }
}
