//! Manifest discovery and lifecycle management
//!
//! The [`ConfigProvider`] owns the set of manifests found in a project
//! tree. It discovers them with a recursive scan, keeps the set current
//! as files appear, change, or vanish, and tracks which manifest is the
//! active build configuration.

mod scanner;

pub use scanner::{is_manifest_candidate, ManifestScanner, ScanReport};

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::config::FlatstageConfig;
use crate::manifest::{self, Manifest, ManifestError};
use crate::util::CancelToken;

/// A filesystem change relevant to manifest tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

/// Callbacks fired as the manifest set changes
///
/// All methods default to no-ops so observers implement only what they
/// care about.
pub trait ProviderObserver: Send + Sync {
    fn manifest_added(&self, _manifest: &Manifest) {}
    fn manifest_updated(&self, _manifest: &Manifest) {}
    fn manifest_removed(&self, _path: &Path) {}
}

/// Discovers and tracks the manifests of one project
pub struct ConfigProvider {
    project_dir: PathBuf,
    config: FlatstageConfig,
    manifests: BTreeMap<PathBuf, Manifest>,
    mtimes: BTreeMap<PathBuf, Option<SystemTime>>,
    active: Option<PathBuf>,
    observers: Vec<Arc<dyn ProviderObserver>>,
    cancel: CancelToken,
}

impl ConfigProvider {
    pub fn new(project_dir: PathBuf, config: FlatstageConfig) -> Self {
        Self {
            project_dir,
            config,
            manifests: BTreeMap::new(),
            mtimes: BTreeMap::new(),
            active: None,
            observers: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ProviderObserver>) {
        self.observers.push(observer);
    }

    /// Scans the project tree and replaces the tracked manifest set
    ///
    /// The scan runs on a blocking worker; results are discarded if the
    /// provider was unloaded in the meantime. Returns the number of
    /// manifests now tracked.
    pub async fn load(&mut self) -> Result<usize> {
        let scanner = ManifestScanner::new(self.project_dir.clone(), &self.config)?;
        self.project_dir = scanner.project_dir().to_path_buf();

        let report = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .context("Manifest scan task panicked")?;
        self.cancel.check()?;

        self.manifests.clear();
        self.mtimes.clear();

        let mut seen = HashSet::new();
        for parsed in report.manifests {
            if !seen.insert(parsed.id()) {
                debug!(id = %parsed.id(), "Duplicate manifest id, skipping");
                continue;
            }
            self.insert_manifest(parsed, true);
        }

        self.active = self.pick_default();
        if let Some(active) = &self.active {
            debug!(active = %active.display(), "Selected default configuration");
        }

        Ok(self.manifests.len())
    }

    /// Cancels pending work and drops all tracked manifests
    ///
    /// An unloaded provider stays unloaded; a later `load` reports
    /// cancellation.
    pub fn unload(&mut self) {
        self.cancel.cancel();
        let paths: Vec<PathBuf> = self.manifests.keys().cloned().collect();
        for path in &paths {
            for observer in &self.observers {
                observer.manifest_removed(path);
            }
        }
        self.manifests.clear();
        self.mtimes.clear();
        self.active = None;
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&Manifest> {
        self.manifests.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Manifest> {
        self.manifests.get_mut(path)
    }

    /// Tracked manifests in path order
    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests.values()
    }

    /// The manifest currently selected as the build configuration
    pub fn active(&self) -> Option<&Manifest> {
        self.active.as_ref().and_then(|path| self.manifests.get(path))
    }

    pub fn set_active(&mut self, path: &Path) -> bool {
        if self.manifests.contains_key(path) {
            self.active = Some(path.to_path_buf());
            true
        } else {
            false
        }
    }

    /// Applies one filesystem event to the tracked set
    pub fn handle_event(&mut self, event: FileEvent) {
        match event {
            FileEvent::Created(path) => self.handle_created(path),
            FileEvent::Modified(path) => self.handle_modified(path),
            FileEvent::Removed(path) => self.handle_removed(&path),
        }
    }

    fn handle_created(&mut self, path: PathBuf) {
        if self.manifests.contains_key(&path) {
            return self.handle_modified(path);
        }

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return,
        };
        if !is_manifest_candidate(name) {
            return;
        }

        match manifest::parse_with_limit(&path, self.config.max_manifest_bytes) {
            Ok(parsed) => {
                info!(
                    path = %path.display(),
                    app_id = parsed.app_id(),
                    "Discovered new manifest"
                );
                self.insert_manifest(parsed, true);
                if self.active.is_none() {
                    self.active = self.pick_default();
                }
            }
            Err(err) => {
                debug!(
                    path = %path.display(),
                    error = %err,
                    "Created file is not a flatpak manifest"
                );
            }
        }
    }

    fn handle_modified(&mut self, path: PathBuf) {
        if !self.manifests.contains_key(&path) {
            return self.handle_created(path);
        }

        match manifest::parse_with_limit(&path, self.config.max_manifest_bytes) {
            Ok(parsed) => {
                // The map is path-keyed, so the swap preserves active status
                self.insert_manifest(parsed, false);
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Manifest no longer parses, keeping previous version"
                );
            }
        }
    }

    fn handle_removed(&mut self, path: &Path) {
        if self.manifests.remove(path).is_some() {
            info!(path = %path.display(), "Manifest removed");
            self.mtimes.remove(path);
            for observer in &self.observers {
                observer.manifest_removed(path);
            }
            if self.active.as_deref() == Some(path) {
                self.active = self.pick_default();
            }
        }
    }

    /// Reconciles the tracked set against the filesystem
    ///
    /// Removed files drop their manifests, changed files reparse, and a
    /// fresh scan picks up new candidates. Files whose modification time
    /// moved but whose content hash is unchanged produce no event.
    pub async fn refresh(&mut self) -> Result<Vec<FileEvent>> {
        let mut events = Vec::new();

        for path in self.manifests.keys().cloned().collect::<Vec<_>>() {
            if !path.exists() {
                self.handle_removed(&path);
                events.push(FileEvent::Removed(path));
                continue;
            }

            let mtime = file_mtime(&path);
            if mtime.is_some() && self.mtimes.get(&path) == Some(&mtime) {
                continue;
            }

            match manifest::parse_with_limit(&path, self.config.max_manifest_bytes) {
                Ok(parsed) => {
                    let changed = self
                        .manifests
                        .get(&path)
                        .map_or(true, |m| m.content_hash() != parsed.content_hash());
                    if changed {
                        self.insert_manifest(parsed, false);
                        events.push(FileEvent::Modified(path));
                    } else {
                        self.mtimes.insert(path, mtime);
                    }
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Manifest no longer parses, keeping previous version"
                    );
                }
            }
        }

        let scanner = ManifestScanner::new(self.project_dir.clone(), &self.config)?;
        let report = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .context("Manifest scan task panicked")?;
        self.cancel.check()?;

        for parsed in report.manifests {
            let path = parsed.path().to_path_buf();
            if !self.manifests.contains_key(&path) {
                self.insert_manifest(parsed, true);
                if self.active.is_none() {
                    self.active = self.pick_default();
                }
                events.push(FileEvent::Created(path));
            }
        }

        Ok(events)
    }

    /// Writes every dirty manifest back to disk, one file at a time
    pub fn save_all(&mut self) -> Result<usize, ManifestError> {
        let mut saved_paths = Vec::new();
        for tracked in self.manifests.values_mut() {
            if tracked.dirty() {
                tracked.save()?;
                saved_paths.push(tracked.path().to_path_buf());
            }
        }

        let saved = saved_paths.len();
        for path in saved_paths {
            let mtime = file_mtime(&path);
            self.mtimes.insert(path, mtime);
        }

        if saved > 0 {
            info!(saved, "Saved dirty manifests");
        }
        Ok(saved)
    }

    fn insert_manifest(&mut self, parsed: Manifest, is_new: bool) {
        let path = parsed.path().to_path_buf();
        self.mtimes.insert(path.clone(), file_mtime(&path));
        if is_new {
            for observer in &self.observers {
                observer.manifest_added(&parsed);
            }
        } else {
            for observer in &self.observers {
                observer.manifest_updated(&parsed);
            }
        }
        self.manifests.insert(path, parsed);
    }

    /// Best default configuration: `-unstable` names win, then an exact
    /// `<app-id>.<ext>` match, then the first manifest in path order
    fn pick_default(&self) -> Option<PathBuf> {
        self.manifests
            .values()
            .min_by_key(|m| default_score(m))
            .map(|m| m.path().to_path_buf())
    }
}

fn default_score(manifest: &Manifest) -> u8 {
    let name = manifest.file_name();
    if name.contains("-unstable") {
        0
    } else if name
        .rsplit_once('.')
        .map(|(stem, _)| stem == manifest.app_id())
        .unwrap_or(false)
    {
        1
    } else {
        2
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn test_config() -> FlatstageConfig {
        FlatstageConfig {
            cache_dir: PathBuf::from("/tmp/flatstage-test"),
            arch: "x86_64".to_string(),
            flatpak_program: "flatpak".to_string(),
            builder_program: "flatpak-builder".to_string(),
            scan_depth: 10,
            max_manifest_bytes: 262_144,
            log_level: "info".to_string(),
        }
    }

    fn manifest_body(app_id: &str) -> String {
        format!(
            r#"{{"app-id": "{}", "runtime": "org.gnome.Platform", "command": "app", "modules": [{{"name": "app"}}]}}"#,
            app_id
        )
    }

    fn project_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        for (name, app_id) in files {
            fs::write(dir.path().join(name), manifest_body(app_id)).unwrap();
        }
        dir
    }

    #[derive(Default)]
    struct CountingObserver {
        added: AtomicUsize,
        updated: AtomicUsize,
        removed: AtomicUsize,
    }

    impl ProviderObserver for CountingObserver {
        fn manifest_added(&self, _manifest: &Manifest) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
        fn manifest_updated(&self, _manifest: &Manifest) {
            self.updated.fetch_add(1, Ordering::SeqCst);
        }
        fn manifest_removed(&self, _path: &Path) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_load_tracks_manifests() {
        let dir = project_with(&[("org.example.App.json", "org.example.App")]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());

        let count = provider.load().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(provider.active().unwrap().app_id(), "org.example.App");
    }

    #[tokio::test]
    async fn test_unstable_manifest_preferred() {
        let dir = project_with(&[
            ("org.example.App.json", "org.example.App"),
            ("org.example.App-unstable.json", "org.example.App"),
        ]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        assert_eq!(
            provider.active().unwrap().file_name(),
            "org.example.App-unstable.json"
        );
    }

    #[tokio::test]
    async fn test_app_id_filename_beats_collation_order() {
        // "org.aaa.First.json" sorts first but does not match its app-id
        let dir = project_with(&[
            ("org.aaa.First.json", "org.example.App"),
            ("org.example.App.json", "org.example.App"),
        ]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        assert_eq!(
            provider.active().unwrap().file_name(),
            "org.example.App.json"
        );
    }

    #[tokio::test]
    async fn test_observer_notified_across_lifecycle() {
        let dir = project_with(&[("org.example.App.json", "org.example.App")]);
        let observer = Arc::new(CountingObserver::default());

        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.add_observer(observer.clone());
        provider.load().await.unwrap();
        assert_eq!(observer.added.load(Ordering::SeqCst), 1);

        let path = provider.active().unwrap().path().to_path_buf();
        provider.handle_event(FileEvent::Modified(path.clone()));
        assert_eq!(observer.updated.load(Ordering::SeqCst), 1);

        provider.handle_event(FileEvent::Removed(path));
        assert_eq!(observer.removed.load(Ordering::SeqCst), 1);
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_created_event_adds_manifest() {
        let dir = project_with(&[("org.example.App.json", "org.example.App")]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        let new_path = provider.project_dir().join("org.example.Other.json");
        fs::write(&new_path, manifest_body("org.example.Other")).unwrap();
        provider.handle_event(FileEvent::Created(new_path.clone()));

        assert_eq!(provider.len(), 2);
        assert!(provider.get(&new_path).is_some());
    }

    #[tokio::test]
    async fn test_created_event_ignores_non_candidates() {
        let dir = project_with(&[("org.example.App.json", "org.example.App")]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        let new_path = provider.project_dir().join("package.json");
        fs::write(&new_path, manifest_body("org.example.Npm")).unwrap();
        provider.handle_event(FileEvent::Created(new_path));

        assert_eq!(provider.len(), 1);
    }

    #[tokio::test]
    async fn test_broken_rewrite_keeps_previous_manifest() {
        let dir = project_with(&[("org.example.App.json", "org.example.App")]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        let path = provider.active().unwrap().path().to_path_buf();
        fs::write(&path, "{broken").unwrap();
        provider.handle_event(FileEvent::Modified(path.clone()));

        assert_eq!(provider.get(&path).unwrap().app_id(), "org.example.App");
    }

    #[tokio::test]
    async fn test_active_survives_modification() {
        let dir = project_with(&[
            ("org.example.App.json", "org.example.App"),
            ("org.example.Zzz.json", "org.example.Zzz"),
        ]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        let zzz = provider.project_dir().join("org.example.Zzz.json");
        assert!(provider.set_active(&zzz));

        fs::write(&zzz, manifest_body("org.example.Zzz")).unwrap();
        provider.handle_event(FileEvent::Modified(zzz.clone()));

        assert_eq!(provider.active().unwrap().path(), zzz);
    }

    #[tokio::test]
    async fn test_removed_active_falls_back_to_default() {
        let dir = project_with(&[
            ("org.example.App.json", "org.example.App"),
            ("org.example.Zzz.json", "org.example.Zzz"),
        ]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        let zzz = provider.project_dir().join("org.example.Zzz.json");
        provider.set_active(&zzz);
        provider.handle_event(FileEvent::Removed(zzz));

        assert_eq!(provider.active().unwrap().app_id(), "org.example.App");
    }

    #[tokio::test]
    async fn test_unload_is_terminal() {
        let dir = project_with(&[("org.example.App.json", "org.example.App")]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        provider.unload();
        assert!(provider.is_empty());
        assert!(provider.active().is_none());
        assert!(provider.load().await.is_err());
    }

    #[tokio::test]
    async fn test_save_all_writes_dirty_manifests() {
        let dir = project_with(&[("org.example.App.json", "org.example.App")]);
        let mut provider = ConfigProvider::new(dir.path().to_path_buf(), test_config());
        provider.load().await.unwrap();

        let path = provider.active().unwrap().path().to_path_buf();
        provider.get_mut(&path).unwrap().set_command("edited");

        assert_eq!(provider.save_all().unwrap(), 1);
        assert!(!provider.get(&path).unwrap().dirty());

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("\"command\": \"edited\""));

        // Nothing left to save
        assert_eq!(provider.save_all().unwrap(), 0);
    }
}
