//! flatstage - manifest-driven flatpak build pipeline
//!
//! This library discovers flatpak manifests in a project tree, parses them
//! into structured build configurations, and drives the `flatpak` and
//! `flatpak-builder` command-line tools through a phase-ordered pipeline
//! with per-stage staleness checks.
//!
//! # Core Concepts
//!
//! - **Manifest**: a declarative JSON or YAML build descriptor naming the
//!   application id, runtime triplet, and module list
//! - **Stage**: one unit of pipeline work with a repeat-safe staleness
//!   query and an execute step that shells out to a build tool
//! - **Phase**: a fixed-order bucket of stages, from preparing directories
//!   through exporting the finished application
//! - **Provider**: the discovery layer that scans the project tree, keeps
//!   parsed manifests fresh across file changes, and picks the best
//!   default configuration
//!
//! # Example Usage
//!
//! ```ignore
//! use flatstage::{BuildPipeline, CancelToken, FlatpakAddin, Phase};
//! use std::path::Path;
//!
//! async fn build(config: flatstage::FlatstageConfig) -> anyhow::Result<()> {
//!     let manifest = flatstage::manifest::parse(Path::new("org.example.App.json"))?;
//!     let mut pipeline = BuildPipeline::new(config, manifest, Path::new("."));
//!     FlatpakAddin::load(&mut pipeline);
//!
//!     let report = pipeline.run(Phase::Build, &CancelToken::new()).await?;
//!     println!("Executed {} stages", report.executed.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`manifest`]: manifest parsing, validation, and writeback
//! - [`provider`]: project scanning and configuration tracking
//! - [`pipeline`]: phase ordering and stage sequencing
//! - [`flatpak`]: the concrete stages that drive the flatpak tools

// Public modules
pub mod cli;
pub mod config;
pub mod flatpak;
pub mod manifest;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod provider;
pub mod util;

// Re-export key types for convenient access
pub use config::{ConfigError, FlatstageConfig};
pub use flatpak::{BuildLocations, FlatpakAddin};
pub use manifest::{Manifest, ManifestError, Module};
pub use pipeline::{
    BuildPipeline, BuildStage, Phase, PipelineError, RunReport, StageContext, StageError,
    StageStatus,
};
pub use progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
pub use provider::{ConfigProvider, FileEvent, ProviderObserver};
pub use util::{CancelToken, Cancelled};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
