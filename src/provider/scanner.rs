//! Recursive manifest discovery

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FlatstageConfig;
use crate::manifest::{self, Manifest, ManifestError};

/// Outcome of one discovery pass over the project tree
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Successfully parsed manifests, sorted by path
    pub manifests: Vec<Manifest>,
    /// Files whose name matched the manifest pattern
    pub candidates: usize,
    /// Candidates over the size limit
    pub skipped_oversize: usize,
    /// Candidates that failed to parse or validate
    pub rejected: usize,
    pub scan_time_ms: u64,
}

/// Walks the project tree looking for `*.*.json|yaml|yml` files
pub struct ManifestScanner {
    project_dir: PathBuf,
    max_depth: usize,
    size_limit: u64,
}

impl ManifestScanner {
    pub fn new(project_dir: PathBuf, config: &FlatstageConfig) -> Result<Self> {
        if !project_dir.exists() {
            return Err(anyhow::anyhow!(
                "Project path does not exist: {:?}",
                project_dir
            ));
        }
        if !project_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "Project path is not a directory: {:?}",
                project_dir
            ));
        }

        let project_dir = project_dir
            .canonicalize()
            .context("Failed to canonicalize project path")?;

        debug!(
            project_dir = %project_dir.display(),
            "ManifestScanner initialized"
        );

        Ok(Self {
            project_dir,
            max_depth: config.scan_depth,
            size_limit: config.max_manifest_bytes,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Scans the tree, parsing every candidate file
    ///
    /// Oversized and unparsable candidates are logged and counted, never
    /// raised as errors; discovery always completes.
    pub fn scan(&self) -> ScanReport {
        let start = Instant::now();

        info!(
            project = %self.project_dir.display(),
            max_depth = self.max_depth,
            "Starting manifest scan"
        );

        let mut report = ScanReport::default();

        for result in WalkBuilder::new(&self.project_dir)
            .max_depth(Some(self.max_depth))
            .hidden(true)
            .git_ignore(true)
            .build()
        {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "Failed to read directory entry");
                    continue;
                }
            };
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !is_manifest_candidate(name) {
                continue;
            }
            report.candidates += 1;

            match manifest::parse_with_limit(path, self.size_limit) {
                Ok(parsed) => report.manifests.push(parsed),
                Err(ManifestError::TooLarge { .. }) => {
                    warn!(
                        path = %path.display(),
                        limit = self.size_limit,
                        "Skipping oversized manifest candidate"
                    );
                    report.skipped_oversize += 1;
                }
                Err(err) => {
                    debug!(
                        path = %path.display(),
                        error = %err,
                        "Not a flatpak manifest, skipping"
                    );
                    report.rejected += 1;
                }
            }
        }

        report.manifests.sort_by(|a, b| a.path().cmp(b.path()));
        report.scan_time_ms = start.elapsed().as_millis() as u64;

        info!(
            manifests = report.manifests.len(),
            candidates = report.candidates,
            rejected = report.rejected,
            scan_time_ms = report.scan_time_ms,
            "Manifest scan completed"
        );

        report
    }
}

/// Whether a file name looks like a flatpak manifest
///
/// Expects at least `a.b.json`, matching the dotted app-id naming
/// convention; a plain `build.json` is not a candidate.
pub fn is_manifest_candidate(name: &str) -> bool {
    if let Some((stem, ext)) = name.rsplit_once('.') {
        matches!(ext, "json" | "yaml" | "yml")
            && stem.split('.').count() >= 2
            && stem.split('.').all(|segment| !segment.is_empty())
    } else {
        false
    }
}
