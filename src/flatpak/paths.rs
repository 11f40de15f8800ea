//! On-disk layout for staging and repository directories

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FlatstageConfig;
use crate::manifest::Manifest;

/// Resolved directory layout for one build configuration
///
/// All paths are derived up front from the cache root, the manifest's
/// runtime triplet and the project's checked-out branch; nothing here
/// touches the filesystem beyond reading `.git/HEAD` once.
#[derive(Debug, Clone)]
pub struct BuildLocations {
    pub project_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub state_dir: PathBuf,
    pub arch: String,
    pub vcs_branch: String,
    pub name: String,
}

impl BuildLocations {
    pub fn new(config: &FlatstageConfig, manifest: &Manifest, project_dir: &Path) -> Self {
        let vcs_branch = read_vcs_branch(project_dir);
        let name = sanitize_dir_name(&format!(
            "{}-{}",
            manifest.runtime_id_for(&config.arch),
            vcs_branch
        ));
        let root = config.flatpak_root();

        Self {
            project_dir: project_dir.to_path_buf(),
            staging_dir: root.join("staging").join(&name),
            repo_dir: root.join("repos").join(&name),
            state_dir: root.join("builder"),
            arch: config.arch.clone(),
            vcs_branch,
            name,
        }
    }

    /// Marker written by `flatpak build-init` at the staging root
    pub fn metadata_file(&self) -> PathBuf {
        self.staging_dir.join("metadata")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.staging_dir.join("files")
    }

    pub fn var_dir(&self) -> PathBuf {
        self.staging_dir.join("var")
    }

    /// Populated by `flatpak build-finish`
    pub fn export_dir(&self) -> PathBuf {
        self.staging_dir.join("export")
    }
}

fn sanitize_dir_name(name: &str) -> String {
    name.replace('/', "-")
}

/// Resolves the checked-out branch of `project_dir`, or "main"
///
/// A detached HEAD is identified by the first eight characters of the
/// commit hash so that builds from different checkouts stay separate.
fn read_vcs_branch(project_dir: &Path) -> String {
    let head = match fs::read_to_string(project_dir.join(".git").join("HEAD")) {
        Ok(contents) => contents,
        Err(_) => return "main".to_string(),
    };
    let head = head.trim();

    if let Some(reference) = head.strip_prefix("ref: refs/heads/") {
        if !reference.is_empty() {
            return reference.to_string();
        }
    } else if head.len() >= 8 && head.chars().all(|c| c.is_ascii_hexdigit()) {
        return head[..8].to_string();
    }

    "main".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(cache_dir: &Path) -> FlatstageConfig {
        FlatstageConfig {
            cache_dir: cache_dir.to_path_buf(),
            arch: "x86_64".to_string(),
            flatpak_program: "flatpak".to_string(),
            builder_program: "flatpak-builder".to_string(),
            scan_depth: 10,
            max_manifest_bytes: 262_144,
            log_level: "info".to_string(),
        }
    }

    fn test_manifest() -> Manifest {
        crate::manifest::parse_bytes(
            Path::new("/projects/app/org.example.App.json"),
            br#"{
                "app-id": "org.example.App",
                "runtime": "org.gnome.Platform",
                "runtime-version": "45",
                "command": "app",
                "modules": [{"name": "app"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_layout_under_cache_root() {
        let config = test_config(Path::new("/tmp/cache"));
        let locations =
            BuildLocations::new(&config, &test_manifest(), Path::new("/projects/app"));

        assert_eq!(locations.vcs_branch, "main");
        assert_eq!(locations.name, "flatpak:org.gnome.Platform-x86_64-45-main");
        assert_eq!(
            locations.staging_dir,
            Path::new("/tmp/cache/flatpak/staging/flatpak:org.gnome.Platform-x86_64-45-main")
        );
        assert_eq!(
            locations.repo_dir,
            Path::new("/tmp/cache/flatpak/repos/flatpak:org.gnome.Platform-x86_64-45-main")
        );
        assert_eq!(locations.state_dir, Path::new("/tmp/cache/flatpak/builder"));
    }

    #[test]
    fn test_staging_markers() {
        let config = test_config(Path::new("/tmp/cache"));
        let locations =
            BuildLocations::new(&config, &test_manifest(), Path::new("/projects/app"));

        assert_eq!(
            locations.metadata_file(),
            locations.staging_dir.join("metadata")
        );
        assert_eq!(locations.files_dir(), locations.staging_dir.join("files"));
        assert_eq!(locations.var_dir(), locations.staging_dir.join("var"));
        assert_eq!(locations.export_dir(), locations.staging_dir.join("export"));
    }

    #[test]
    fn test_branch_from_git_head() {
        let project = TempDir::new().unwrap();
        fs::create_dir(project.path().join(".git")).unwrap();
        fs::write(
            project.path().join(".git/HEAD"),
            "ref: refs/heads/wip/rework\n",
        )
        .unwrap();

        let config = test_config(Path::new("/tmp/cache"));
        let locations = BuildLocations::new(&config, &test_manifest(), project.path());

        assert_eq!(locations.vcs_branch, "wip/rework");
        // Branch separators collapse into the directory name
        assert!(locations.name.ends_with("-wip-rework"));
    }

    #[test]
    fn test_detached_head_uses_short_hash() {
        let project = TempDir::new().unwrap();
        fs::create_dir(project.path().join(".git")).unwrap();
        fs::write(
            project.path().join(".git/HEAD"),
            "0123456789abcdef0123456789abcdef01234567\n",
        )
        .unwrap();

        let config = test_config(Path::new("/tmp/cache"));
        let locations = BuildLocations::new(&config, &test_manifest(), project.path());

        assert_eq!(locations.vcs_branch, "01234567");
    }

    #[test]
    fn test_missing_git_falls_back_to_main() {
        let project = TempDir::new().unwrap();
        let config = test_config(Path::new("/tmp/cache"));
        let locations = BuildLocations::new(&config, &test_manifest(), project.path());

        assert_eq!(locations.vcs_branch, "main");
    }
}
