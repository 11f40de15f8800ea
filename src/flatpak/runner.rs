//! Sandboxed command construction for incremental builds and app runs
//!
//! Both entry points wrap their payload in `flatpak build` against the
//! staging directory, so the child sees the same environment the
//! finished application would.

use super::paths::BuildLocations;
use crate::config::FlatstageConfig;
use crate::manifest::Manifest;
use crate::process::CommandLine;

/// Finish-arg prefixes that are safe to replay on `flatpak build`
const FINISH_ARG_PASSTHROUGH: [&str; 10] = [
    "--allow",
    "--share",
    "--socket",
    "--filesystem",
    "--device",
    "--env",
    "--system-talk",
    "--own-name",
    "--talk-name",
    "--add-policy",
];

fn can_pass_through(arg: &str) -> bool {
    FINISH_ARG_PASSTHROUGH
        .iter()
        .any(|prefix| arg.starts_with(prefix))
}

fn sandbox_base(config: &FlatstageConfig, locations: &BuildLocations) -> CommandLine {
    CommandLine::new(&config.flatpak_program)
        .arg("build")
        .arg("--with-appdir")
        .arg("--allow=devel")
        .arg("--die-with-parent")
        .arg(format!("--filesystem={}", locations.project_dir.display()))
        .current_dir(&locations.project_dir)
}

/// Builds the command line that runs `inner` inside the build sandbox
///
/// Used for incremental builds of the primary module, where the
/// manifest's build-args and build-options environment must be in
/// effect but flatpak-builder itself is too heavyweight.
pub fn sandbox_build_command(
    config: &FlatstageConfig,
    manifest: &Manifest,
    locations: &BuildLocations,
    inner: &[String],
) -> CommandLine {
    let options = manifest.build_options();
    let module = &manifest.primary_module().name;
    let mut cmd = sandbox_base(config, locations)
        .env("TERM", "xterm-256color")
        .env("COLORTERM", "truecolor")
        .arg("--nofilesystem=host")
        // The project tree appears where flatpak-builder would have
        // built the primary module, so build dirs stay valid
        .arg(format!(
            "--bind-mount=/run/build/{}={}",
            module,
            locations.project_dir.display()
        ))
        .arg(format!("--build-dir=/run/build/{}", module))
        .args(manifest.build_args().iter().cloned());

    // Incremental builds fetch sources the one-shot build already had
    if !manifest.build_args().iter().any(|arg| arg == "--share=network") {
        cmd = cmd.arg("--share=network");
    }

    for (key, value) in &options.env {
        cmd = cmd.arg(format!("--env={}={}", key, value));
    }
    if let Some(cflags) = &options.cflags {
        cmd = cmd.arg(format!("--env=CFLAGS={}", cflags));
    }
    if let Some(cxxflags) = &options.cxxflags {
        cmd = cmd.arg(format!("--env=CXXFLAGS={}", cxxflags));
    }
    let path = match &options.append_path {
        Some(append) => format!("/app/bin:/usr/bin:{}", append),
        None => "/app/bin:/usr/bin".to_string(),
    };
    cmd = cmd.arg(format!("--env=PATH={}", path));

    cmd.arg(locations.staging_dir.display().to_string())
        .args(inner.iter().cloned())
}

/// Builds the command line that launches the staged application
///
/// Manifest finish-args are replayed when their prefix is meaningful to
/// `flatpak build`; a manifest without any usable finish-args falls back
/// to a conventional interactive sandbox.
pub fn app_run_command(
    config: &FlatstageConfig,
    manifest: &Manifest,
    locations: &BuildLocations,
    extra: &[String],
) -> CommandLine {
    let mut cmd = sandbox_base(config, locations);

    let passed: Vec<&String> = manifest
        .finish_args()
        .iter()
        .filter(|arg| can_pass_through(arg.as_str()))
        .collect();
    if passed.is_empty() {
        cmd = cmd
            .arg("--share=ipc")
            .arg("--share=network")
            .arg("--socket=x11")
            .arg("--socket=wayland");
    } else {
        for arg in passed {
            cmd = cmd.arg(arg.clone());
        }
    }
    cmd = cmd.arg("--talk-name=org.freedesktop.portal.*");

    cmd.arg(locations.staging_dir.display().to_string())
        .arg(manifest.command())
        .args(extra.iter().cloned())
}
