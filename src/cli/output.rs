//! Output formatting for multiple formats
//!
//! This module provides formatters for discovery listings, manifest
//! details, and pipeline run reports in JSON, YAML, and human-readable
//! text. Each formatter implements consistent styling and structure.
//!
//! # Example
//!
//! ```ignore
//! use flatstage::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! let output = formatter.format_manifest(&info)?;
//! println!("{}", output);
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::manifest::Manifest;
use crate::pipeline::RunReport;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Flattened view of one parsed manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub path: PathBuf,
    pub app_id: String,
    pub runtime: String,
    pub runtime_version: Option<String>,
    pub sdk: Option<String>,
    pub branch: String,
    pub runtime_id: String,
    pub command: String,
    pub primary_module: String,
    pub sdk_extensions: Vec<String>,
    pub finish_args: Vec<String>,
    pub config_opts: Vec<String>,
    pub build_commands: Vec<String>,
    pub is_default: bool,
    pub dirty: bool,
}

impl ManifestInfo {
    pub fn from_manifest(manifest: &Manifest, is_default: bool) -> Self {
        let primary = manifest.primary_module();
        Self {
            path: manifest.path().to_path_buf(),
            app_id: manifest.app_id().to_string(),
            runtime: manifest.runtime().to_string(),
            runtime_version: manifest.runtime_version().map(str::to_string),
            sdk: manifest.sdk().map(str::to_string),
            branch: manifest.branch().to_string(),
            runtime_id: manifest.runtime_id(),
            command: manifest.command().to_string(),
            primary_module: primary.name.clone(),
            sdk_extensions: manifest.sdk_extensions().to_vec(),
            finish_args: manifest.finish_args().to_vec(),
            config_opts: primary.config_opts.clone(),
            build_commands: primary.build_commands.clone(),
            is_default,
            dirty: manifest.dirty(),
        }
    }
}

/// Result of a discovery scan over one project tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub project: PathBuf,
    pub count: usize,
    pub manifests: Vec<ManifestInfo>,
}

/// Output formatter for discovery, inspection, and run reports
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Creates a new output formatter with the specified format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a discovery report according to the configured format
    pub fn format_discovery(&self, report: &DiscoveryReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize discovery report to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(report)
                .context("Failed to serialize discovery report to YAML"),
            OutputFormat::Human => Ok(self.format_discovery_human(report)),
        }
    }

    /// Formats a single manifest's details
    pub fn format_manifest(&self, info: &ManifestInfo) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(info)
                .context("Failed to serialize manifest info to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(info).context("Failed to serialize manifest info to YAML")
            }
            OutputFormat::Human => Ok(self.format_manifest_human(info)),
        }
    }

    /// Formats a completed pipeline run report
    pub fn format_run(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize run report to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize run report to YAML")
            }
            OutputFormat::Human => Ok(self.format_run_human(report)),
        }
    }

    fn rule() -> String {
        "\u{2501}".repeat(42)
    }

    fn format_discovery_human(&self, report: &DiscoveryReport) -> String {
        let mut output = String::new();

        if report.count > 0 {
            output.push_str("\u{2713} Flatpak Manifest Discovery\n");
        } else {
            output.push_str("\u{26A0} Flatpak Manifest Discovery (Nothing Found)\n");
        }
        output.push_str(&Self::rule());
        output.push_str("\n\n");

        output.push_str(&format!("Project:   {}\n", report.project.display()));
        output.push_str(&format!("Manifests: {}\n\n", report.count));

        for (i, info) in report.manifests.iter().enumerate() {
            let is_last = i == report.manifests.len() - 1;
            let connector = if is_last { "\u{2514}\u{2500}" } else { "\u{251C}\u{2500}" };
            let continuation = if is_last { "   " } else { "\u{2502}  " };
            let marker = if info.is_default { " (default)" } else { "" };

            output.push_str(&format!(
                "{} {}{}\n",
                connector,
                info.path.display(),
                marker
            ));
            output.push_str(&format!(
                "{} app: {}  runtime: {}/{}\n",
                continuation, info.app_id, info.runtime, info.branch
            ));
        }

        output
    }

    fn format_manifest_human(&self, info: &ManifestInfo) -> String {
        let mut output = String::new();

        output.push_str("\u{2713} Flatpak Manifest\n");
        output.push_str(&Self::rule());
        output.push_str("\n\n");

        output.push_str(&format!("Manifest:  {}\n", info.path.display()));
        output.push_str(&format!("App ID:    {}\n", info.app_id));
        output.push_str(&format!("Command:   {}\n", info.command));
        if info.is_default {
            output.push_str("Default:   yes\n");
        }
        output.push('\n');

        output.push_str("Runtime Information:\n");
        output.push_str(&format!("\u{251C}\u{2500} Runtime:    {}\n", info.runtime));
        output.push_str(&format!("\u{251C}\u{2500} Branch:     {}\n", info.branch));
        match &info.sdk {
            Some(sdk) => output.push_str(&format!("\u{251C}\u{2500} SDK:        {}\n", sdk)),
            None => output.push_str("\u{251C}\u{2500} SDK:        (same as runtime)\n"),
        }
        output.push_str(&format!("\u{2514}\u{2500} Runtime ID: {}\n", info.runtime_id));
        if !info.sdk_extensions.is_empty() {
            output.push_str(&format!(
                "SDK Extensions: {}\n",
                info.sdk_extensions.join(", ")
            ));
        }
        output.push('\n');

        output.push_str("Build Information:\n");
        output.push_str(&format!(
            "\u{251C}\u{2500} Primary Module: {}\n",
            info.primary_module
        ));
        if info.config_opts.is_empty() {
            output.push_str("\u{251C}\u{2500} Config Opts:    (none)\n");
        } else {
            output.push_str(&format!(
                "\u{251C}\u{2500} Config Opts:    {}\n",
                info.config_opts.join(" ")
            ));
        }
        output.push_str(&format!(
            "\u{2514}\u{2500} Build Commands: {}\n",
            info.build_commands.len()
        ));
        output.push('\n');

        if info.finish_args.is_empty() {
            output.push_str("Finish Args: (none)\n");
        } else {
            output.push_str(&format!("Finish Args: {}\n", info.finish_args.join(", ")));
        }

        if info.dirty {
            output.push_str("\n\u{26A0} Unsaved configuration edits pending\n");
        }

        output
    }

    fn format_run_human(&self, report: &RunReport) -> String {
        let mut output = String::new();

        output.push_str("\u{2713} Pipeline Run Complete\n");
        output.push_str(&Self::rule());
        output.push_str("\n\n");

        output.push_str(&format!("Target Phase: {}\n\n", report.target));

        output.push_str("Executed Stages:\n");
        if report.executed.is_empty() {
            output.push_str("(none - everything was up to date)\n");
        } else {
            for (i, stage) in report.executed.iter().enumerate() {
                let is_last = i == report.executed.len() - 1;
                let connector = if is_last { "\u{2514}" } else { "\u{251C}" };
                output.push_str(&format!("{}\u{2500} {}\n", connector, stage));
            }
        }
        output.push_str(&format!("\nSkipped (up to date): {}\n", report.skipped.len()));
        output.push_str(&format!("\nProcessed in {}ms\n", report.duration_ms));

        output
    }
}
