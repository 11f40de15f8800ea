//! Pipeline assembly and stage sequencing

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use super::phase::Phase;
use super::stage::{BuildStage, StageContext, StageError, StageStatus};
use crate::config::FlatstageConfig;
use crate::flatpak::BuildLocations;
use crate::manifest::Manifest;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::util::{CancelToken, Cancelled};

/// Handle identifying an attached stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(u64);

/// Errors that abort a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("Pipeline run was cancelled")]
    Cancelled,

    #[error("Pipeline did not settle after {0} stage selections")]
    Diverged(usize),
}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        PipelineError::Cancelled
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: Phase,
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

struct StageEntry {
    id: StageId,
    phase: Phase,
    priority: i32,
    seq: u64,
    completed: bool,
    stage: Box<dyn BuildStage>,
}

/// Phase-ordered stage sequencer for one build configuration
///
/// Stages attach to a fixed phase with a priority; `run` walks the
/// attached stages in (phase, priority, attach order), querying each for
/// staleness and executing the ones that need work. A stage failure
/// aborts the remaining stages of that run; earlier completions are
/// never rolled back.
pub struct BuildPipeline {
    config: FlatstageConfig,
    manifest: Manifest,
    locations: BuildLocations,
    entries: Vec<StageEntry>,
    handler: Arc<dyn ProgressHandler>,
    next_id: u64,
    next_seq: u64,
}

impl BuildPipeline {
    pub fn new(config: FlatstageConfig, manifest: Manifest, project_dir: &Path) -> Self {
        let locations = BuildLocations::new(&config, &manifest, project_dir);
        Self {
            config,
            manifest,
            locations,
            entries: Vec::new(),
            handler: Arc::new(NoOpHandler),
            next_id: 1,
            next_seq: 0,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &FlatstageConfig {
        &self.config
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn locations(&self) -> &BuildLocations {
        &self.locations
    }

    pub fn stage_count(&self) -> usize {
        self.entries.len()
    }

    /// Attaches a stage to a phase
    ///
    /// Within a phase, lower priorities run first; equal priorities run
    /// in attachment order.
    pub fn attach(&mut self, phase: Phase, priority: i32, stage: Box<dyn BuildStage>) -> StageId {
        let id = StageId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        debug!(stage = stage.name(), phase = %phase, priority, "Attaching stage");

        let pos = self
            .entries
            .partition_point(|e| (e.phase, e.priority, e.seq) < (phase, priority, seq));
        self.entries.insert(
            pos,
            StageEntry {
                id,
                phase,
                priority,
                seq,
                completed: false,
                stage,
            },
        );
        id
    }

    /// Removes a stage; returns false when the id is unknown
    pub fn detach(&mut self, id: StageId) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            let entry = self.entries.remove(pos);
            debug!(stage = entry.stage.name(), "Detached stage");
            true
        } else {
            false
        }
    }

    pub fn is_completed(&self, id: StageId) -> bool {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.completed)
            .unwrap_or(false)
    }

    /// Marks every stage of `phase` stale
    pub fn invalidate_phase(&mut self, phase: Phase) -> usize {
        let mut count = 0;
        for entry in self.entries.iter_mut().filter(|e| e.phase == phase) {
            entry.completed = false;
            count += 1;
        }
        count
    }

    /// Runs all stages up to and including `target`
    ///
    /// Cancellation is checked before each stage selection and once more
    /// before reporting; a process already spawned runs to completion.
    pub async fn run(
        &mut self,
        target: Phase,
        cancel: &CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let selected = self.entries.iter().filter(|e| e.phase <= target).count();

        info!(target_phase = %target, stages = selected, "Starting pipeline run");
        self.handler.on_progress(&ProgressEvent::RunStarted {
            target,
            stages: selected,
        });

        let result = self.execute_stages(target, cancel).await;

        // Transient stages never outlive a run
        self.entries.retain(|e| !e.stage.transient());

        match result {
            Ok((executed, skipped)) => {
                let total_time = start.elapsed();
                info!(
                    executed = executed.len(),
                    skipped = skipped.len(),
                    duration_ms = total_time.as_millis() as u64,
                    "Pipeline run complete"
                );
                self.handler.on_progress(&ProgressEvent::RunCompleted {
                    executed: executed.len(),
                    skipped: skipped.len(),
                    total_time,
                });
                Ok(RunReport {
                    target,
                    executed,
                    skipped,
                    duration_ms: total_time.as_millis() as u64,
                })
            }
            Err(err) => {
                self.handler.on_progress(&ProgressEvent::RunFailed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Selects and runs stages until none are left unvisited
    ///
    /// Selection always restarts from the front, so a stage that
    /// invalidates an earlier phase sends the run back to re-execute it
    /// before later phases continue. The selection budget catches stages
    /// that keep invalidating each other.
    async fn execute_stages(
        &mut self,
        target: Phase,
        cancel: &CancelToken,
    ) -> Result<(Vec<String>, Vec<String>), PipelineError> {
        let mut executed = Vec::new();
        let mut skipped = Vec::new();
        let mut visited: HashSet<StageId> = HashSet::new();
        let budget = self.entries.len() * 4 + 8;
        let mut selections = 0usize;

        loop {
            cancel.check()?;

            let idx = match self
                .entries
                .iter()
                .position(|e| e.phase <= target && !visited.contains(&e.id))
            {
                Some(idx) => idx,
                None => break,
            };

            selections += 1;
            if selections > budget {
                return Err(PipelineError::Diverged(selections));
            }

            let id = self.entries[idx].id;
            let phase = self.entries[idx].phase;
            let name = self.entries[idx].stage.name().to_string();
            let always_run = self.entries[idx].stage.always_run();

            let mut ctx = StageContext::new(
                &self.config,
                &self.manifest,
                &self.locations,
                cancel,
                name.clone(),
                phase,
                self.handler.as_ref(),
            );
            let entry = &mut self.entries[idx];
            let status = entry
                .stage
                .query(&mut ctx)
                .await
                .map_err(|source| PipelineError::Stage {
                    stage: name.clone(),
                    source,
                })?;
            entry.completed = matches!(status, StageStatus::Completed);
            let invalidations = ctx.take_invalidations();
            self.apply_invalidations(&invalidations, &mut visited);

            if matches!(status, StageStatus::Completed) && !always_run {
                debug!(stage = %name, phase = %phase, "Stage already complete, skipping");
                self.handler.on_progress(&ProgressEvent::StageSkipped {
                    stage: name.clone(),
                    phase,
                });
                visited.insert(id);
                skipped.push(name);
                continue;
            }

            self.handler.on_progress(&ProgressEvent::StageStarted {
                stage: name.clone(),
                phase,
            });
            let stage_start = Instant::now();

            let mut ctx = StageContext::new(
                &self.config,
                &self.manifest,
                &self.locations,
                cancel,
                name.clone(),
                phase,
                self.handler.as_ref(),
            );
            let entry = &mut self.entries[idx];
            let result = entry.stage.execute(&mut ctx).await;
            let invalidations = ctx.take_invalidations();

            match result {
                Ok(()) => {
                    entry.completed = true;
                    self.apply_invalidations(&invalidations, &mut visited);
                    visited.insert(id);
                    self.handler.on_progress(&ProgressEvent::StageCompleted {
                        stage: name.clone(),
                        phase,
                        duration: stage_start.elapsed(),
                    });
                    executed.push(name);
                }
                Err(source) => {
                    self.handler.on_progress(&ProgressEvent::StageFailed {
                        stage: name.clone(),
                        phase,
                        error: source.to_string(),
                    });
                    return Err(PipelineError::Stage {
                        stage: name,
                        source,
                    });
                }
            }
        }

        cancel.check()?;
        Ok((executed, skipped))
    }

    fn apply_invalidations(&mut self, phases: &[Phase], visited: &mut HashSet<StageId>) {
        for phase in phases {
            info!(phase = %phase, "Invalidating phase");
            self.handler
                .on_progress(&ProgressEvent::PhaseInvalidated { phase: *phase });
            for entry in self.entries.iter_mut().filter(|e| e.phase == *phase) {
                entry.completed = false;
                visited.remove(&entry.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct RecordingStage {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BuildStage for RecordingStage {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&mut self, _ctx: &mut StageContext<'_>) -> Result<(), StageError> {
            self.log.lock().unwrap().push(self.name.clone());
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

    fn test_pipeline() -> BuildPipeline {
        let manifest = crate::manifest::parse_bytes(
            Path::new("/projects/app/org.example.App.json"),
            br#"{"app-id": "org.example.App", "runtime": "org.gnome.Platform", "command": "app", "modules": [{"name": "app"}]}"#,
        )
        .unwrap();
        BuildPipeline::new(test_config(), manifest, Path::new("/projects/app"))
    }

    fn recorder(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn BuildStage> {
        Box::new(RecordingStage {
            name: name.to_string(),
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_phase_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = test_pipeline();

        pipeline.attach(Phase::Export, 0, recorder("export", &log));
        pipeline.attach(Phase::Prepare, 0, recorder("prepare", &log));
        pipeline.attach(Phase::Build, 0, recorder("build", &log));

        pipeline
            .run(Phase::Export, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), ["prepare", "build", "export"]);
    }

    #[tokio::test]
    async fn test_priority_orders_within_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = test_pipeline();

        pipeline.attach(Phase::Prepare, 10, recorder("second", &log));
        pipeline.attach(Phase::Prepare, 0, recorder("first", &log));
        pipeline.attach(Phase::Prepare, 10, recorder("third", &log));

        pipeline
            .run(Phase::Prepare, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_run_stops_at_target_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = test_pipeline();

        pipeline.attach(Phase::Prepare, 0, recorder("prepare", &log));
        pipeline.attach(Phase::Export, 0, recorder("export", &log));

        pipeline
            .run(Phase::Build, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), ["prepare"]);
    }

    #[tokio::test]
    async fn test_detach_removes_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = test_pipeline();

        let id = pipeline.attach(Phase::Prepare, 0, recorder("gone", &log));
        assert!(pipeline.detach(id));
        assert!(!pipeline.detach(id));
        assert_eq!(pipeline.stage_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = test_pipeline();
        pipeline.attach(Phase::Prepare, 0, recorder("prepare", &log));

        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline.run(Phase::Export, &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(log.lock().unwrap().is_empty());
    }
}
