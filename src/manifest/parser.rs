//! Manifest file parsing and validation

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::model::{BuildOptions, Manifest, ManifestFormat, Module, ModuleEntry};

/// Largest file size considered a manifest candidate
pub const MANIFEST_SIZE_LIMIT: u64 = 256 * 1024;

/// Errors from parsing or persisting a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} exceeds the {limit} byte manifest size limit", path.display())]
    TooLarge { path: PathBuf, limit: u64 },

    #[error("Failed to parse {}: {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    #[error("{} is not a JSON object", path.display())]
    NotAnObject { path: PathBuf },

    #[error("{} is missing required field '{field}'", path.display())]
    MissingField { path: PathBuf, field: &'static str },

    #[error("{} does not have a valid app-id: '{app_id}'", path.display())]
    InvalidAppId { path: PathBuf, app_id: String },

    #[error("{} has no resolvable primary module", path.display())]
    NoPrimaryModule { path: PathBuf },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize {}: {message}", path.display())]
    Serialize { path: PathBuf, message: String },
}

/// Raw top-level manifest keys before validation
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawManifest {
    id: Option<String>,
    app_id: Option<String>,
    runtime: Option<String>,
    runtime_version: Option<String>,
    sdk: Option<String>,
    sdk_version: Option<String>,
    sdk_extensions: Vec<String>,
    command: Option<String>,
    build_args: Vec<String>,
    finish_args: Vec<String>,
    build_options: Option<BuildOptions>,
    modules: Vec<ModuleEntry>,
}

/// Parses a manifest file, enforcing the default size limit
pub fn parse(path: &Path) -> Result<Manifest, ManifestError> {
    parse_with_limit(path, MANIFEST_SIZE_LIMIT)
}

/// Parses a manifest file, rejecting files larger than `limit` bytes
pub fn parse_with_limit(path: &Path, limit: u64) -> Result<Manifest, ManifestError> {
    let metadata = fs::metadata(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.len() > limit {
        return Err(ManifestError::TooLarge {
            path: path.to_path_buf(),
            limit,
        });
    }

    let bytes = fs::read(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bytes(path, &bytes)
}

/// Parses manifest content already read from `path`
///
/// YAML documents are translated to a JSON value tree first, so both
/// formats validate through the same field lookups. A manifest is valid
/// only when `app-id` (or `id`), `runtime`, `command`, and a primary
/// module all resolve; empty strings count as missing.
pub fn parse_bytes(path: &Path, bytes: &[u8]) -> Result<Manifest, ManifestError> {
    let format = ManifestFormat::from_path(path);

    let doc: serde_json::Value = match format {
        ManifestFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| ManifestError::Syntax {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        }
        ManifestFormat::Yaml => {
            serde_yaml::from_slice(bytes).map_err(|e| ManifestError::Syntax {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        }
    };

    if !doc.is_object() {
        return Err(ManifestError::NotAnObject {
            path: path.to_path_buf(),
        });
    }

    let raw: RawManifest =
        serde_json::from_value(doc.clone()).map_err(|e| ManifestError::Syntax {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let app_id = non_empty(raw.app_id)
        .or_else(|| non_empty(raw.id))
        .ok_or(ManifestError::MissingField {
            path: path.to_path_buf(),
            field: "app-id",
        })?;
    if !is_valid_app_id(&app_id) {
        return Err(ManifestError::InvalidAppId {
            path: path.to_path_buf(),
            app_id,
        });
    }
    let runtime = non_empty(raw.runtime).ok_or(ManifestError::MissingField {
        path: path.to_path_buf(),
        field: "runtime",
    })?;
    let command = non_empty(raw.command).ok_or(ManifestError::MissingField {
        path: path.to_path_buf(),
        field: "command",
    })?;

    let primary_module =
        select_primary_module(path, &raw.modules).ok_or(ManifestError::NoPrimaryModule {
            path: path.to_path_buf(),
        })?;

    Ok(Manifest {
        path: path.to_path_buf(),
        format,
        doc,
        app_id,
        runtime,
        runtime_version: non_empty(raw.runtime_version),
        sdk: non_empty(raw.sdk),
        sdk_version: non_empty(raw.sdk_version),
        sdk_extensions: raw.sdk_extensions,
        command,
        build_args: raw.build_args,
        finish_args: raw.finish_args,
        build_options: raw.build_options.unwrap_or_default(),
        primary_module,
        content_hash: content_hash(bytes),
        dirty: false,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Application ids are dotted reverse-DNS names with at least two
/// segments, e.g. `org.example.App`
fn is_valid_app_id(app_id: &str) -> bool {
    let segments: Vec<&str> = app_id.split('.').collect();
    segments.len() >= 2
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}

/// Picks the module presumed to be the user's own project
///
/// Prefers a module named after the manifest's containing directory,
/// searched back to front at any nesting depth, then falls back to the
/// last inline module of the top-level array.
fn select_primary_module(path: &Path, modules: &[ModuleEntry]) -> Option<Module> {
    let dir_name = path
        .parent()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str);

    if let Some(dir_name) = dir_name {
        if let Some(found) = find_named(modules, dir_name) {
            return Some(found.clone());
        }
    }

    modules.iter().rev().find_map(|entry| match entry {
        ModuleEntry::Inline(module) if !module.name.is_empty() => Some(module.clone()),
        _ => None,
    })
}

fn find_named<'a>(modules: &'a [ModuleEntry], name: &str) -> Option<&'a Module> {
    for entry in modules.iter().rev() {
        if let ModuleEntry::Inline(module) = entry {
            if module.name == name {
                return Some(module);
            }
            if let Some(found) = find_named(&module.modules, name) {
                return Some(found);
            }
        }
    }
    None
}

pub(crate) fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
