//! Flatpak-specific pipeline stages and directory layout
//!
//! The addin inspects a manifest and attaches the stages that drive the
//! `flatpak` and `flatpak-builder` tools; everything here is argument
//! construction and staleness checks, never tool semantics.

mod addin;
mod paths;
mod runner;
mod stages;

pub use addin::FlatpakAddin;
pub use paths::BuildLocations;
pub use runner::{app_run_command, sandbox_build_command};
pub use stages::{
    BuildExportStage, BuildFinishStage, BuildInitStage, BundleStage, DependenciesStage,
    EnsureInstalledStage, MkdirsStage, RemotesStage,
};
