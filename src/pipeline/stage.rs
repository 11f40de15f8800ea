//! Stage trait and execution context

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use super::phase::Phase;
use crate::config::FlatstageConfig;
use crate::flatpak::BuildLocations;
use crate::manifest::Manifest;
use crate::process::{self, CommandLine, ProcessError};
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::util::{CancelToken, Cancelled};

/// Result of a stage's staleness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage's work is missing or stale and execute must run
    NeedsRun,
    /// The stage's output is already in place
    Completed,
}

/// Errors a stage can surface to the pipeline
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Stage was cancelled")]
    Cancelled,
}

impl From<Cancelled> for StageError {
    fn from(_: Cancelled) -> Self {
        StageError::Cancelled
    }
}

/// One unit of pipeline work
///
/// `query` is a staleness check that must be safe to call repeatedly;
/// only `execute` may change the build tree. The pipeline skips a stage
/// whose query reports [`StageStatus::Completed`], unless the stage is
/// marked always-run.
#[async_trait]
pub trait BuildStage: Send + Sync {
    fn name(&self) -> &str;

    /// Always-run stages execute on every run, even when already complete
    fn always_run(&self) -> bool {
        false
    }

    /// Transient stages are detached from the pipeline after one run
    fn transient(&self) -> bool {
        false
    }

    async fn query(&mut self, _ctx: &mut StageContext<'_>) -> Result<StageStatus, StageError> {
        Ok(StageStatus::NeedsRun)
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError>;
}

/// Everything a stage can see while it runs
///
/// Borrowed from the pipeline for the duration of one query or execute
/// call. Stages reach external tools through [`run_command`] and
/// [`probe_command`] so cancellation and output forwarding stay uniform.
///
/// [`run_command`]: StageContext::run_command
/// [`probe_command`]: StageContext::probe_command
pub struct StageContext<'a> {
    pub config: &'a FlatstageConfig,
    pub manifest: &'a Manifest,
    pub locations: &'a BuildLocations,
    pub cancel: &'a CancelToken,
    stage_name: String,
    phase: Phase,
    handler: &'a dyn ProgressHandler,
    invalidations: Vec<Phase>,
}

impl<'a> StageContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: &'a FlatstageConfig,
        manifest: &'a Manifest,
        locations: &'a BuildLocations,
        cancel: &'a CancelToken,
        stage_name: String,
        phase: Phase,
        handler: &'a dyn ProgressHandler,
    ) -> Self {
        Self {
            config,
            manifest,
            locations,
            cancel,
            stage_name,
            phase,
            handler,
            invalidations: Vec::new(),
        }
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Marks every stage of `phase` stale so it re-runs, even within the
    /// current pipeline run
    pub fn invalidate_phase(&mut self, phase: Phase) {
        self.invalidations.push(phase);
    }

    pub(crate) fn take_invalidations(&mut self) -> Vec<Phase> {
        std::mem::take(&mut self.invalidations)
    }

    /// Signals that the stage entered a long-running background step
    pub fn pause(&self) {
        self.handler.on_progress(&ProgressEvent::StagePaused {
            stage: self.stage_name.clone(),
        });
    }

    pub fn resume(&self) {
        self.handler.on_progress(&ProgressEvent::StageResumed {
            stage: self.stage_name.clone(),
        });
    }

    /// Reports progress while a stale directory tree is being deleted
    pub fn emit_reap_progress(&self, path: &Path, removed: u64) {
        self.handler.on_progress(&ProgressEvent::ReapProgress {
            path: path.to_path_buf(),
            removed,
        });
    }

    /// Runs a build tool to completion, forwarding its output as events
    ///
    /// Checks for cancellation before spawning; a process already under
    /// way is never killed.
    pub async fn run_command(&self, cmd: &CommandLine) -> Result<(), StageError> {
        self.cancel.check()?;

        info!(stage = %self.stage_name, command = %cmd, "Running command");

        process::run_streamed(cmd, |stream, line| {
            self.handler.on_progress(&ProgressEvent::ProcessOutput {
                stage: self.stage_name.clone(),
                stream,
                line: line.to_string(),
            });
        })
        .await?;

        Ok(())
    }

    /// Runs a probe command, reporting its exit status as a boolean
    pub async fn probe_command(&self, cmd: &CommandLine) -> Result<bool, StageError> {
        self.cancel.check()?;
        Ok(process::probe(cmd).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_bytes;
    use crate::progress::NoOpHandler;
    use std::path::PathBuf;

    struct NoopStage;

    #[async_trait]
    impl BuildStage for NoopStage {
        fn name(&self) -> &str {
            "noop"
        }

        async fn execute(&mut self, _ctx: &mut StageContext<'_>) -> Result<(), StageError> {
            Ok(())
        }
    }

    fn test_config() -> FlatstageConfig {
        FlatstageConfig {
            cache_dir: PathBuf::from("/tmp/flatstage-test"),
            arch: "x86_64".to_string(),
            flatpak_program: "flatpak".to_string(),
            builder_program: "flatpak-builder".to_string(),
            scan_depth: 10,
            max_manifest_bytes: 262_144,
            log_level: "info".to_string(),
        }
    }

    fn test_manifest() -> Manifest {
        parse_bytes(
            Path::new("/projects/app/org.example.App.json"),
            br#"{"app-id": "org.example.App", "runtime": "org.gnome.Platform", "command": "app", "modules": [{"name": "app"}]}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_query_needs_run() {
        let config = test_config();
        let manifest = test_manifest();
        let locations = BuildLocations::new(&config, &manifest, Path::new("/projects/app"));
        let cancel = CancelToken::new();
        let handler = NoOpHandler;

        let mut ctx = StageContext::new(
            &config,
            &manifest,
            &locations,
            &cancel,
            "noop".to_string(),
            Phase::Build,
            &handler,
        );

        let mut stage = NoopStage;
        assert_eq!(stage.query(&mut ctx).await.unwrap(), StageStatus::NeedsRun);
        assert!(!stage.always_run());
        assert!(!stage.transient());
    }

    #[tokio::test]
    async fn test_invalidations_are_collected() {
        let config = test_config();
        let manifest = test_manifest();
        let locations = BuildLocations::new(&config, &manifest, Path::new("/projects/app"));
        let cancel = CancelToken::new();
        let handler = NoOpHandler;

        let mut ctx = StageContext::new(
            &config,
            &manifest,
            &locations,
            &cancel,
            "noop".to_string(),
            Phase::BuildInit,
            &handler,
        );

        ctx.invalidate_phase(Phase::Dependencies);
        assert_eq!(ctx.take_invalidations(), [Phase::Dependencies]);
        assert!(ctx.take_invalidations().is_empty());
    }

    #[tokio::test]
    async fn test_run_command_refuses_after_cancel() {
        let config = test_config();
        let manifest = test_manifest();
        let locations = BuildLocations::new(&config, &manifest, Path::new("/projects/app"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let handler = NoOpHandler;

        let ctx = StageContext::new(
            &config,
            &manifest,
            &locations,
            &cancel,
            "noop".to_string(),
            Phase::Build,
            &handler,
        );

        let cmd = CommandLine::new("/bin/true");
        assert!(matches!(
            ctx.run_command(&cmd).await,
            Err(StageError::Cancelled)
        ));
    }
}
