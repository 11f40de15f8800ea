//! Command handlers wiring the CLI onto the library
//!
//! Each handler resolves the project and manifest, assembles a pipeline
//! when the command needs one, and maps failures onto a process exit
//! code. All user-facing reports go through [`OutputFormatter`].

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::commands::{
    BuildArgs, BundleArgs, CleanArgs, DiscoverArgs, ExecArgs, ExportArgs, InspectArgs, RunArgs,
};
use super::output::{DiscoveryReport, ManifestInfo, OutputFormatter};
use crate::config::FlatstageConfig;
use crate::flatpak::{app_run_command, sandbox_build_command, BuildLocations, FlatpakAddin};
use crate::manifest::{self, Manifest};
use crate::pipeline::{BuildPipeline, Phase};
use crate::process;
use crate::progress::LoggingHandler;
use crate::provider::ConfigProvider;
use crate::util::{reap_dir, CancelToken};

pub async fn handle_discover(args: &DiscoverArgs) -> i32 {
    exit_from(run_discover(args).await)
}

pub async fn handle_inspect(args: &InspectArgs) -> i32 {
    exit_from(run_inspect(args).await)
}

pub async fn handle_build(args: &BuildArgs) -> i32 {
    exit_from(run_build(args).await)
}

pub async fn handle_export(args: &ExportArgs) -> i32 {
    exit_from(run_export(args).await)
}

pub async fn handle_bundle(args: &BundleArgs) -> i32 {
    exit_from(run_bundle(args).await)
}

pub async fn handle_run(args: &RunArgs) -> i32 {
    exit_from(run_run(args).await)
}

pub async fn handle_exec(args: &ExecArgs) -> i32 {
    exit_from(run_exec(args).await)
}

pub async fn handle_clean(args: &CleanArgs) -> i32 {
    exit_from(run_clean(args).await)
}

fn exit_from(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            1
        }
    }
}

async fn run_discover(args: &DiscoverArgs) -> Result<i32> {
    let config = load_config()?;
    let project = resolve_project(args.project.as_deref())?;
    let mut provider = ConfigProvider::new(project.clone(), config);
    provider.load().await?;

    let active_path = provider.active().map(|m| m.path().to_path_buf());
    let manifests: Vec<ManifestInfo> = provider
        .manifests()
        .map(|m| ManifestInfo::from_manifest(m, Some(m.path()) == active_path.as_deref()))
        .collect();
    let report = DiscoveryReport {
        project,
        count: manifests.len(),
        manifests,
    };

    let formatter = OutputFormatter::new(args.format.into());
    println!("{}", formatter.format_discovery(&report)?);
    Ok(0)
}

async fn run_inspect(args: &InspectArgs) -> Result<i32> {
    let config = load_config()?;
    let project = resolve_project(args.project.as_deref())?;
    let mut provider = ConfigProvider::new(project.clone(), config);
    provider.load().await?;

    let manifest = select_manifest(&provider, args.manifest.as_deref(), &project)?;
    let is_default = provider.active().map(|m| m.path()) == Some(manifest.path());
    let info = ManifestInfo::from_manifest(&manifest, is_default);

    let formatter = OutputFormatter::new(args.format.into());
    println!("{}", formatter.format_manifest(&info)?);
    Ok(0)
}

async fn run_build(args: &BuildArgs) -> Result<i32> {
    let setup = load_setup(args.project.as_deref(), args.manifest.as_deref()).await?;
    let mut pipeline = make_pipeline(&setup);

    let cancel = cancel_on_ctrl_c();
    let report = pipeline.run(args.through.into(), &cancel).await?;

    let formatter = OutputFormatter::new(args.format.into());
    println!("{}", formatter.format_run(&report)?);
    Ok(0)
}

async fn run_export(args: &ExportArgs) -> Result<i32> {
    let setup = load_setup(args.project.as_deref(), args.manifest.as_deref()).await?;
    let mut pipeline = make_pipeline(&setup);

    let cancel = cancel_on_ctrl_c();
    let report = pipeline.run(Phase::Export, &cancel).await?;

    let formatter = OutputFormatter::new(args.format.into());
    println!("{}", formatter.format_run(&report)?);
    Ok(0)
}

async fn run_bundle(args: &BundleArgs) -> Result<i32> {
    let setup = load_setup(args.project.as_deref(), args.manifest.as_deref()).await?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.flatpak", setup.manifest.app_id())));

    let mut pipeline = make_pipeline(&setup);
    FlatpakAddin::attach_bundle(&mut pipeline, output.clone());

    let cancel = cancel_on_ctrl_c();
    pipeline.run(Phase::Export, &cancel).await?;

    println!("Bundle written to {}", output.display());
    Ok(0)
}

async fn run_run(args: &RunArgs) -> Result<i32> {
    let setup = load_setup(args.project.as_deref(), args.manifest.as_deref()).await?;
    let mut pipeline = make_pipeline(&setup);

    let cancel = cancel_on_ctrl_c();
    pipeline.run(Phase::Commit, &cancel).await?;

    let cmd = app_run_command(
        &setup.config,
        &setup.manifest,
        pipeline.locations(),
        &args.args,
    );
    info!(command = %cmd, "Launching application");

    // The application's exit code becomes ours
    let code = process::run_interactive(&cmd).await?;
    Ok(code)
}

async fn run_exec(args: &ExecArgs) -> Result<i32> {
    let setup = load_setup(args.project.as_deref(), args.manifest.as_deref()).await?;
    let mut pipeline = make_pipeline(&setup);

    // The sandbox needs an initialized staging tree with dependencies
    // built, but not a finalized application
    let cancel = cancel_on_ctrl_c();
    pipeline.run(Phase::BuildInit, &cancel).await?;

    let cmd = sandbox_build_command(
        &setup.config,
        &setup.manifest,
        pipeline.locations(),
        &args.command,
    );
    info!(command = %cmd, "Running command in build sandbox");

    let code = process::run_interactive(&cmd).await?;
    Ok(code)
}

async fn run_clean(args: &CleanArgs) -> Result<i32> {
    let setup = load_setup(args.project.as_deref(), args.manifest.as_deref()).await?;
    let locations = BuildLocations::new(&setup.config, &setup.manifest, &setup.project);

    let mut removed = reap_path(&locations.staging_dir).await?;
    if args.repos {
        removed += reap_path(&locations.repo_dir).await?;
    }

    println!("Removed {} entries", removed);
    Ok(0)
}

struct BuildSetup {
    config: FlatstageConfig,
    project: PathBuf,
    manifest: Manifest,
}

async fn load_setup(
    project_arg: Option<&Path>,
    manifest_arg: Option<&Path>,
) -> Result<BuildSetup> {
    let config = load_config()?;
    let project = resolve_project(project_arg)?;
    let mut provider = ConfigProvider::new(project.clone(), config.clone());
    provider.load().await?;

    let manifest = select_manifest(&provider, manifest_arg, &project)?;
    info!(
        manifest = %manifest.path().display(),
        app_id = manifest.app_id(),
        "Selected build configuration"
    );

    Ok(BuildSetup {
        config,
        project,
        manifest,
    })
}

fn make_pipeline(setup: &BuildSetup) -> BuildPipeline {
    let mut pipeline = BuildPipeline::new(
        setup.config.clone(),
        setup.manifest.clone(),
        &setup.project,
    )
    .with_handler(Arc::new(LoggingHandler));
    FlatpakAddin::load(&mut pipeline);
    pipeline
}

fn load_config() -> Result<FlatstageConfig> {
    let config = FlatstageConfig::default();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn resolve_project(arg: Option<&Path>) -> Result<PathBuf> {
    let dir = match arg {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().context("Failed to resolve current directory")?,
    };
    dir.canonicalize()
        .with_context(|| format!("Project directory not found: {}", dir.display()))
}

/// Picks the manifest a command should operate on
///
/// An explicit path wins, falling back to a direct parse when the file
/// lies outside the provider's scan scope. Without one, the provider's
/// best default configuration is used.
fn select_manifest(
    provider: &ConfigProvider,
    requested: Option<&Path>,
    project: &Path,
) -> Result<Manifest> {
    if let Some(requested) = requested {
        let path = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            project.join(requested)
        };
        let path = path
            .canonicalize()
            .with_context(|| format!("Manifest not found: {}", requested.display()))?;
        if let Some(found) = provider.get(&path) {
            return Ok(found.clone());
        }
        return Ok(manifest::parse(&path)?);
    }

    match provider.active() {
        Some(active) => Ok(active.clone()),
        None => bail!("No flatpak manifest found under {}", project.display()),
    }
}

fn cancel_on_ctrl_c() -> CancelToken {
    let token = CancelToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, the current stage will finish first");
            handle.cancel();
        }
    });
    token
}

async fn reap_path(path: &Path) -> Result<u64> {
    if !path.exists() {
        info!(path = %path.display(), "Already clean");
        return Ok(0);
    }
    let removed = reap_dir(path, |_| {})
        .await
        .with_context(|| format!("Failed to remove {}", path.display()))?;
    info!(path = %path.display(), removed, "Removed directory tree");
    Ok(removed)
}
