//! Wires the flatpak stage set into a pipeline

use std::path::PathBuf;
use tracing::debug;

use super::stages::{
    BuildExportStage, BuildFinishStage, BuildInitStage, BundleStage, DependenciesStage,
    EnsureInstalledStage, MkdirsStage, RemotesStage,
};
use crate::pipeline::{BuildPipeline, Phase};

/// Attaches the flatpak-specific stages for a manifest-backed build
pub struct FlatpakAddin;

impl FlatpakAddin {
    /// Registers the standard stage set against the pipeline's manifest
    ///
    /// The SDK install stage is only attached when the manifest names an
    /// SDK distinct from its runtime; the runtime ref covers it otherwise.
    pub fn load(pipeline: &mut BuildPipeline) {
        let manifest = pipeline.manifest();
        let arch = pipeline.locations().arch.clone();
        let runtime = manifest.runtime().to_string();
        let branch = manifest.branch().to_string();
        let sdk = manifest.sdk().map(str::to_string);
        let sdk_branch = manifest
            .sdk_version()
            .unwrap_or(manifest.branch())
            .to_string();
        let remotes = RemotesStage::for_manifest(manifest);

        pipeline.attach(Phase::Prepare, 0, Box::new(MkdirsStage));
        pipeline.attach(Phase::Prepare, 10, Box::new(remotes));

        let platform_ref = format!("runtime/{}/{}/{}", runtime, arch, branch);
        pipeline.attach(
            Phase::Downloads,
            0,
            Box::new(EnsureInstalledStage::new("install-platform", platform_ref)),
        );

        if let Some(sdk) = sdk {
            if sdk != runtime {
                let sdk_ref = format!("runtime/{}/{}/{}", sdk, arch, sdk_branch);
                pipeline.attach(
                    Phase::Downloads,
                    10,
                    Box::new(EnsureInstalledStage::new("install-sdk", sdk_ref)),
                );
            }
        }

        pipeline.attach(Phase::Dependencies, 0, Box::new(DependenciesStage));
        pipeline.attach(Phase::BuildInit, 0, Box::new(BuildInitStage));
        pipeline.attach(Phase::Commit, 0, Box::new(BuildFinishStage));
        pipeline.attach(Phase::Export, 0, Box::new(BuildExportStage));

        debug!(stages = pipeline.stage_count(), "Flatpak stages attached");
    }

    /// Queues a one-shot bundle stage after the export stage
    pub fn attach_bundle(pipeline: &mut BuildPipeline, output: PathBuf) {
        pipeline.attach(Phase::Export, 10, Box::new(BundleStage::new(output)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlatstageConfig;
    use crate::manifest::Manifest;
    use std::path::Path;

    fn test_config() -> FlatstageConfig {
        FlatstageConfig {
            cache_dir: "/tmp/flatstage-test".into(),
            arch: "x86_64".to_string(),
            flatpak_program: "flatpak".to_string(),
            builder_program: "flatpak-builder".to_string(),
            scan_depth: 10,
            max_manifest_bytes: 262_144,
            log_level: "info".to_string(),
        }
    }

    fn manifest_with(body: &str) -> Manifest {
        crate::manifest::parse_bytes(Path::new("/projects/app/org.example.App.json"), body.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_load_attaches_full_stage_set() {
        let manifest = manifest_with(
            r#"{
                "app-id": "org.example.App",
                "runtime": "org.freedesktop.Platform",
                "sdk": "org.freedesktop.Sdk",
                "command": "app",
                "modules": [{"name": "app"}]
            }"#,
        );
        let mut pipeline = BuildPipeline::new(test_config(), manifest, Path::new("/projects/app"));

        FlatpakAddin::load(&mut pipeline);
        assert_eq!(pipeline.stage_count(), 8);
    }

    #[test]
    fn test_sdk_install_skipped_when_sdk_matches_runtime() {
        let manifest = manifest_with(
            r#"{
                "app-id": "org.example.App",
                "runtime": "org.gnome.Platform",
                "sdk": "org.gnome.Platform",
                "command": "app",
                "modules": [{"name": "app"}]
            }"#,
        );
        let mut pipeline = BuildPipeline::new(test_config(), manifest, Path::new("/projects/app"));

        FlatpakAddin::load(&mut pipeline);
        assert_eq!(pipeline.stage_count(), 7);
    }

    #[test]
    fn test_sdk_install_skipped_when_sdk_absent() {
        let manifest = manifest_with(
            r#"{
                "app-id": "org.example.App",
                "runtime": "org.gnome.Platform",
                "command": "app",
                "modules": [{"name": "app"}]
            }"#,
        );
        let mut pipeline = BuildPipeline::new(test_config(), manifest, Path::new("/projects/app"));

        FlatpakAddin::load(&mut pipeline);
        assert_eq!(pipeline.stage_count(), 7);
    }

    #[test]
    fn test_attach_bundle_adds_one_stage() {
        let manifest = manifest_with(
            r#"{
                "app-id": "org.example.App",
                "runtime": "org.gnome.Platform",
                "command": "app",
                "modules": [{"name": "app"}]
            }"#,
        );
        let mut pipeline = BuildPipeline::new(test_config(), manifest, Path::new("/projects/app"));

        FlatpakAddin::load(&mut pipeline);
        let before = pipeline.stage_count();
        FlatpakAddin::attach_bundle(&mut pipeline, "/tmp/out.flatpak".into());
        assert_eq!(pipeline.stage_count(), before + 1);
    }
}
