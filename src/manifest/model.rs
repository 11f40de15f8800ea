//! In-memory manifest representation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use super::parser::{content_hash, ManifestError};

/// On-disk serialization format of a manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Yaml,
}

impl ManifestFormat {
    /// Infers the format from the file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// One module from the manifest's `modules` array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Module {
    pub name: String,
    pub buildsystem: Option<String>,
    pub config_opts: Vec<String>,
    pub build_commands: Vec<String>,
    pub post_install: Vec<String>,
    pub builddir: bool,
    pub modules: Vec<ModuleEntry>,
}

/// Entry in a `modules` array
///
/// Flatpak manifests mix inline module objects with string references to
/// external module files. Anything else is carried through untouched so a
/// single odd element never rejects the whole manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleEntry {
    Reference(String),
    Inline(Module),
    Other(serde_json::Value),
}

/// The manifest's `build-options` object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildOptions {
    pub env: BTreeMap<String, String>,
    pub cflags: Option<String>,
    pub cxxflags: Option<String>,
    pub prefix: Option<String>,
    pub append_path: Option<String>,
}

/// A parsed and validated Flatpak manifest
///
/// Holds the discovered build descriptors alongside the raw document
/// tree, so edits can be written back without disturbing keys this model
/// does not understand.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub(crate) path: PathBuf,
    pub(crate) format: ManifestFormat,
    pub(crate) doc: serde_json::Value,
    pub(crate) app_id: String,
    pub(crate) runtime: String,
    pub(crate) runtime_version: Option<String>,
    pub(crate) sdk: Option<String>,
    pub(crate) sdk_version: Option<String>,
    pub(crate) sdk_extensions: Vec<String>,
    pub(crate) command: String,
    pub(crate) build_args: Vec<String>,
    pub(crate) finish_args: Vec<String>,
    pub(crate) build_options: BuildOptions,
    pub(crate) primary_module: Module,
    pub(crate) content_hash: String,
    pub(crate) dirty: bool,
}

impl Manifest {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ManifestFormat {
        self.format
    }

    /// The raw document tree as parsed from disk
    pub fn doc(&self) -> &serde_json::Value {
        &self.doc
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn runtime_version(&self) -> Option<&str> {
        self.runtime_version.as_deref()
    }

    pub fn sdk(&self) -> Option<&str> {
        self.sdk.as_deref()
    }

    pub fn sdk_version(&self) -> Option<&str> {
        self.sdk_version.as_deref()
    }

    pub fn sdk_extensions(&self) -> &[String] {
        &self.sdk_extensions
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn build_args(&self) -> &[String] {
        &self.build_args
    }

    pub fn finish_args(&self) -> &[String] {
        &self.finish_args
    }

    pub fn build_options(&self) -> &BuildOptions {
        &self.build_options
    }

    pub fn primary_module(&self) -> &Module {
        &self.primary_module
    }

    /// Hex digest of the file content this manifest was parsed from
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// True when in-memory edits have not been written back yet
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Stable identity combining file name and content hash
    pub fn id(&self) -> String {
        format!("{}@{}", self.file_name(), self.content_hash)
    }

    /// Runtime branch, defaulting to `master` when unversioned
    pub fn branch(&self) -> &str {
        self.runtime_version.as_deref().unwrap_or("master")
    }

    /// Runtime identifier for the host architecture
    pub fn runtime_id(&self) -> String {
        self.runtime_id_for(super::default_arch())
    }

    /// Runtime identifier of the form `flatpak:<runtime>/<arch>/<branch>`
    pub fn runtime_id_for(&self, arch: &str) -> String {
        format!("flatpak:{}/{}/{}", self.runtime, arch, self.branch())
    }

    pub fn set_command(&mut self, command: impl Into<String>) {
        let command = command.into();
        if let Some(root) = self.doc.as_object_mut() {
            root.insert(
                "command".to_string(),
                serde_json::Value::String(command.clone()),
            );
        }
        self.command = command;
        self.dirty = true;
    }

    pub fn set_runtime(&mut self, runtime: impl Into<String>) {
        let runtime = runtime.into();
        if let Some(root) = self.doc.as_object_mut() {
            root.insert(
                "runtime".to_string(),
                serde_json::Value::String(runtime.clone()),
            );
        }
        self.runtime = runtime;
        self.dirty = true;
    }

    /// Replaces the primary module's `config-opts` in both the model and
    /// the document tree
    pub fn set_config_opts(&mut self, opts: Vec<String>) {
        if let Some(path) = module_path(&self.doc, &self.primary_module.name) {
            if let Some(object) = module_object_mut(&mut self.doc, &path) {
                object.insert(
                    "config-opts".to_string(),
                    serde_json::Value::from(opts.clone()),
                );
            }
        }
        self.primary_module.config_opts = opts;
        self.dirty = true;
    }

    /// Sets one variable in `build-options.env`, creating the containing
    /// objects as needed
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(options) = self.build_options_object() {
            let env = options
                .entry("env".to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if !env.is_object() {
                *env = serde_json::Value::Object(serde_json::Map::new());
            }
            if let Some(env) = env.as_object_mut() {
                env.insert(key.clone(), serde_json::Value::String(value.clone()));
            }
        }
        self.build_options.env.insert(key, value);
        self.dirty = true;
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if let Some(options) = self.build_options_object() {
            options.insert(
                "prefix".to_string(),
                serde_json::Value::String(prefix.clone()),
            );
        }
        self.build_options.prefix = Some(prefix);
        self.dirty = true;
    }

    fn build_options_object(&mut self) -> Option<&mut serde_json::Map<String, serde_json::Value>> {
        let root = self.doc.as_object_mut()?;
        let options = root
            .entry("build-options".to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if !options.is_object() {
            *options = serde_json::Value::Object(serde_json::Map::new());
        }
        options.as_object_mut()
    }

    /// Writes pending edits back to the manifest file
    ///
    /// Serializes the full document tree in the original format, so keys
    /// outside this model survive the round trip.
    pub fn save(&mut self) -> Result<(), ManifestError> {
        let rendered = match self.format {
            ManifestFormat::Json => {
                let mut text = serde_json::to_string_pretty(&self.doc).map_err(|e| {
                    ManifestError::Serialize {
                        path: self.path.clone(),
                        message: e.to_string(),
                    }
                })?;
                text.push('\n');
                text
            }
            ManifestFormat::Yaml => {
                serde_yaml::to_string(&self.doc).map_err(|e| ManifestError::Serialize {
                    path: self.path.clone(),
                    message: e.to_string(),
                })?
            }
        };

        fs::write(&self.path, rendered.as_bytes()).map_err(|source| ManifestError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.content_hash = content_hash(rendered.as_bytes());
        self.dirty = false;
        Ok(())
    }
}

/// Index path of the named module inside nested `modules` arrays
fn module_path(value: &serde_json::Value, name: &str) -> Option<Vec<usize>> {
    let modules = value.get("modules")?.as_array()?;
    for (idx, entry) in modules.iter().enumerate() {
        if entry.get("name").and_then(serde_json::Value::as_str) == Some(name) {
            return Some(vec![idx]);
        }
        if let Some(mut rest) = module_path(entry, name) {
            let mut path = vec![idx];
            path.append(&mut rest);
            return Some(path);
        }
    }
    None
}

fn module_object_mut<'a>(
    doc: &'a mut serde_json::Value,
    path: &[usize],
) -> Option<&'a mut serde_json::Map<String, serde_json::Value>> {
    let mut current = doc;
    for idx in path {
        current = current.get_mut("modules")?.get_mut(*idx)?;
    }
    current.as_object_mut()
}
