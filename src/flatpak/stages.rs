//! Build stages that drive the flatpak tools
//!
//! Every stage here builds a fixed command line from manifest fields and
//! the resolved directory layout, then hands it to the stage context for
//! execution. Staleness checks look only at the filesystem so they stay
//! safe to repeat.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::paths::BuildLocations;
use crate::config::FlatstageConfig;
use crate::manifest::Manifest;
use crate::pipeline::{BuildStage, Phase, StageContext, StageError, StageStatus};
use crate::process::CommandLine;
use crate::util::reap_dir;

const FLATHUB_REMOTE: (&str, &str) = ("flathub", "https://dl.flathub.org/repo/flathub.flatpakrepo");
const GNOME_NIGHTLY_REMOTE: (&str, &str) =
    ("gnome-nightly", "https://nightly.gnome.org/gnome-nightly.flatpakrepo");

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

/// Creation failures are warnings; the stage that needs the directory
/// surfaces the real error when its command runs.
fn ensure_dir(path: &Path) {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o750);
    }
    if let Err(err) = builder.create(path) {
        warn!(path = %path.display(), error = %err, "Failed to create directory");
    }
}

/// Creates the repo, builder-state and staging parent directories
///
/// The staging directory itself belongs to `flatpak build-init`; creating
/// it here would make a fresh tree look like a stale one.
pub struct MkdirsStage;

#[async_trait]
impl BuildStage for MkdirsStage {
    fn name(&self) -> &str {
        "mkdirs"
    }

    async fn query(&mut self, ctx: &mut StageContext<'_>) -> Result<StageStatus, StageError> {
        let staging_parent = ctx.locations.staging_dir.parent();
        let present = ctx.locations.repo_dir.is_dir()
            && ctx.locations.state_dir.is_dir()
            && staging_parent.map(Path::is_dir).unwrap_or(true);
        if present {
            Ok(StageStatus::Completed)
        } else {
            Ok(StageStatus::NeedsRun)
        }
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        ensure_dir(&ctx.locations.repo_dir);
        ensure_dir(&ctx.locations.state_dir);
        if let Some(parent) = ctx.locations.staging_dir.parent() {
            ensure_dir(parent);
        }
        Ok(())
    }
}

/// Registers the remote the manifest's runtime resolves against
pub struct RemotesStage {
    remote_name: &'static str,
    remote_url: &'static str,
}

impl RemotesStage {
    /// Nightly GNOME runtimes come from gnome-nightly; everything else
    /// resolves against flathub.
    pub fn for_manifest(manifest: &Manifest) -> Self {
        let (remote_name, remote_url) =
            if manifest.runtime().starts_with("org.gnome.") && manifest.branch() == "master" {
                GNOME_NIGHTLY_REMOTE
            } else {
                FLATHUB_REMOTE
            };
        Self {
            remote_name,
            remote_url,
        }
    }
}

#[async_trait]
impl BuildStage for RemotesStage {
    fn name(&self) -> &str {
        "remotes"
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        // --if-not-exists keeps this idempotent across runs
        let cmd = CommandLine::new(&ctx.config.flatpak_program)
            .arg("remote-add")
            .arg("--user")
            .arg("--if-not-exists")
            .arg("--from")
            .arg(self.remote_name)
            .arg(self.remote_url);
        ctx.run_command(&cmd).await
    }
}

/// Installs a runtime ref unless `flatpak info` already knows it
pub struct EnsureInstalledStage {
    stage_name: String,
    runtime_ref: String,
}

impl EnsureInstalledStage {
    pub fn new(stage_name: impl Into<String>, runtime_ref: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            runtime_ref: runtime_ref.into(),
        }
    }
}

#[async_trait]
impl BuildStage for EnsureInstalledStage {
    fn name(&self) -> &str {
        &self.stage_name
    }

    async fn query(&mut self, ctx: &mut StageContext<'_>) -> Result<StageStatus, StageError> {
        let cmd = CommandLine::new(&ctx.config.flatpak_program)
            .arg("info")
            .arg("--user")
            .arg(&self.runtime_ref);
        if ctx.probe_command(&cmd).await? {
            Ok(StageStatus::Completed)
        } else {
            Ok(StageStatus::NeedsRun)
        }
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let cmd = CommandLine::new(&ctx.config.flatpak_program)
            .arg("install")
            .arg("--user")
            .arg("--assumeyes")
            .arg(&self.runtime_ref);
        ctx.run_command(&cmd).await
    }
}

/// Builds every module before the primary one via flatpak-builder
///
/// flatpak-builder keeps its own incremental state under the state dir,
/// so this stage re-runs on every pipeline run and stays cheap when
/// nothing changed.
pub struct DependenciesStage;

#[async_trait]
impl BuildStage for DependenciesStage {
    fn name(&self) -> &str {
        "dependencies"
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let cmd = dependencies_command(ctx.config, ctx.manifest, ctx.locations);
        ctx.run_command(&cmd).await
    }
}

/// Initializes the staging directory with `flatpak build-init`
///
/// The query treats the staging tree as valid only when all three
/// markers written by build-init are present. A staging directory with
/// any marker missing is wiped before the stage reports needs-run, and
/// the dependencies phase is invalidated so it rebuilds against the
/// fresh tree.
pub struct BuildInitStage;

#[async_trait]
impl BuildStage for BuildInitStage {
    fn name(&self) -> &str {
        "build-init"
    }

    async fn query(&mut self, ctx: &mut StageContext<'_>) -> Result<StageStatus, StageError> {
        let staging = ctx.locations.staging_dir.clone();
        let complete = ctx.locations.metadata_file().is_file()
            && ctx.locations.files_dir().is_dir()
            && ctx.locations.var_dir().is_dir();

        if complete {
            return Ok(StageStatus::Completed);
        }

        if staging.is_dir() {
            warn!(path = %staging.display(), "Staging directory is incomplete, removing it");
            ctx.pause();
            let result = reap_dir(&staging, |removed| {
                if removed % 32 == 0 {
                    ctx.emit_reap_progress(&staging, removed);
                }
            })
            .await;
            ctx.resume();
            match result {
                Ok(removed) => ctx.emit_reap_progress(&staging, removed),
                Err(err) => {
                    warn!(path = %staging.display(), error = %err, "Failed to remove stale staging directory")
                }
            }
            ctx.invalidate_phase(Phase::Dependencies);
        }

        Ok(StageStatus::NeedsRun)
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let cmd = build_init_command(ctx.config, ctx.manifest, ctx.locations);
        ctx.run_command(&cmd).await
    }
}

/// Finalizes the staging tree with `flatpak build-finish`
pub struct BuildFinishStage;

#[async_trait]
impl BuildStage for BuildFinishStage {
    fn name(&self) -> &str {
        "build-finish"
    }

    async fn query(&mut self, ctx: &mut StageContext<'_>) -> Result<StageStatus, StageError> {
        // build-finish writes the export tree; its presence means the
        // staging tree was already finalized
        if ctx.locations.export_dir().is_dir() {
            Ok(StageStatus::Completed)
        } else {
            Ok(StageStatus::NeedsRun)
        }
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let cmd = finish_command(ctx.config, ctx.manifest, ctx.locations);
        ctx.run_command(&cmd).await
    }
}

/// Exports the finished staging tree into the local OSTree repo
pub struct BuildExportStage;

#[async_trait]
impl BuildStage for BuildExportStage {
    fn name(&self) -> &str {
        "build-export"
    }

    fn always_run(&self) -> bool {
        true
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        ensure_dir(&ctx.locations.repo_dir);
        let cmd = export_command(ctx.config, ctx.manifest, ctx.locations);
        ctx.run_command(&cmd).await
    }
}

/// Writes a single-file bundle from the exported repo
///
/// Attached only for explicit bundle requests and detached again after
/// the run.
pub struct BundleStage {
    output: PathBuf,
}

impl BundleStage {
    pub fn new(output: PathBuf) -> Self {
        Self { output }
    }
}

#[async_trait]
impl BuildStage for BundleStage {
    fn name(&self) -> &str {
        "build-bundle"
    }

    fn always_run(&self) -> bool {
        true
    }

    fn transient(&self) -> bool {
        true
    }

    async fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let cmd = bundle_command(ctx.config, ctx.manifest, ctx.locations, &self.output);
        ctx.run_command(&cmd).await
    }
}

fn build_init_command(
    config: &FlatstageConfig,
    manifest: &Manifest,
    locations: &BuildLocations,
) -> CommandLine {
    let sdk = manifest.sdk().unwrap_or_else(|| manifest.runtime());
    let mut cmd = CommandLine::new(&config.flatpak_program)
        .arg("build-init")
        .arg("--type=app")
        .arg(format!("--arch={}", locations.arch))
        .arg(path_str(&locations.staging_dir))
        .arg(manifest.app_id())
        .arg(sdk)
        .arg(manifest.runtime())
        .arg(manifest.branch());
    for extension in manifest.sdk_extensions() {
        cmd = cmd.arg(format!("--sdk-extension={}", extension));
    }
    cmd
}

fn dependencies_command(
    config: &FlatstageConfig,
    manifest: &Manifest,
    locations: &BuildLocations,
) -> CommandLine {
    CommandLine::new(&config.builder_program)
        .arg("--ccache")
        .arg("--force-clean")
        .arg(format!("--state-dir={}", locations.state_dir.display()))
        .arg(format!("--stop-at={}", manifest.primary_module().name))
        .arg(path_str(&locations.staging_dir))
        .arg(path_str(manifest.path()))
}

fn finish_command(
    config: &FlatstageConfig,
    manifest: &Manifest,
    locations: &BuildLocations,
) -> CommandLine {
    CommandLine::new(&config.flatpak_program)
        .arg("build-finish")
        .arg(format!("--command={}", manifest.command()))
        .args(manifest.finish_args().iter().cloned())
        .arg(path_str(&locations.staging_dir))
}

fn export_command(
    config: &FlatstageConfig,
    manifest: &Manifest,
    locations: &BuildLocations,
) -> CommandLine {
    CommandLine::new(&config.flatpak_program)
        .arg("build-export")
        .arg(format!("--arch={}", locations.arch))
        .arg(path_str(&locations.repo_dir))
        .arg(path_str(&locations.staging_dir))
        .arg(manifest.branch())
}

fn bundle_command(
    config: &FlatstageConfig,
    manifest: &Manifest,
    locations: &BuildLocations,
    output: &Path,
) -> CommandLine {
    CommandLine::new(&config.flatpak_program)
        .arg("build-bundle")
        .arg(format!("--arch={}", locations.arch))
        .arg(path_str(&locations.repo_dir))
        .arg(path_str(output))
        .arg(manifest.app_id())
        .arg(manifest.branch())
}
