//! Configuration management for flatstage
//!
//! This module provides a configuration system that loads settings from
//! environment variables with sensible defaults. Configuration covers cache
//! locations, the target Flatpak architecture, manifest discovery limits, and
//! the external programs the pipeline shells out to.
//!
//! # Environment Variables
//!
//! - `FLATSTAGE_CACHE_DIR`: Cache root for staging/repo directories - default: `<user cache dir>/flatstage`
//! - `FLATSTAGE_ARCH`: Target Flatpak architecture - default: host architecture
//! - `FLATSTAGE_FLATPAK_BIN`: `flatpak` executable to invoke - default: "flatpak"
//! - `FLATSTAGE_BUILDER_BIN`: `flatpak-builder` executable to invoke - default: "flatpak-builder"
//! - `FLATSTAGE_SCAN_DEPTH`: Maximum manifest discovery depth - default: "10"
//! - `FLATSTAGE_MANIFEST_LIMIT`: Maximum manifest size in bytes - default: "262144" (256KB)
//! - `FLATSTAGE_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use flatstage::FlatstageConfig;
//!
//! let config = FlatstageConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("staging under {}", config.cache_dir.display());
//! ```

use crate::manifest::default_arch;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default values for configuration
const DEFAULT_FLATPAK_BIN: &str = "flatpak";
const DEFAULT_BUILDER_BIN: &str = "flatpak-builder";
const DEFAULT_SCAN_DEPTH: usize = 10;
const DEFAULT_MANIFEST_LIMIT: u64 = 262_144; // 256KB
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Main configuration structure for flatstage
///
/// Constructed via `Default::default()`, which loads from environment
/// variables with fallback defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatstageConfig {
    /// Cache root; staging and repo directories live under `<cache_dir>/flatpak/`
    pub cache_dir: PathBuf,

    /// Target Flatpak architecture (x86_64, aarch64, i386, arm)
    pub arch: String,

    /// Program invoked for `flatpak ...` commands
    pub flatpak_program: String,

    /// Program invoked for dependency builds
    pub builder_program: String,

    /// Maximum directory depth for manifest discovery
    pub scan_depth: usize,

    /// Maximum size of a manifest candidate in bytes
    pub max_manifest_bytes: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for FlatstageConfig {
    fn default() -> Self {
        let cache_dir = env::var("FLATSTAGE_CACHE_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(env::temp_dir)
                    .join("flatstage")
            });

        let arch = env::var("FLATSTAGE_ARCH")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_arch().to_string());

        let flatpak_program =
            env::var("FLATSTAGE_FLATPAK_BIN").unwrap_or_else(|_| DEFAULT_FLATPAK_BIN.to_string());

        let builder_program =
            env::var("FLATSTAGE_BUILDER_BIN").unwrap_or_else(|_| DEFAULT_BUILDER_BIN.to_string());

        let scan_depth = env::var("FLATSTAGE_SCAN_DEPTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_SCAN_DEPTH);

        let max_manifest_bytes = env::var("FLATSTAGE_MANIFEST_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MANIFEST_LIMIT);

        let log_level = env::var("FLATSTAGE_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            cache_dir,
            arch,
            flatpak_program,
            builder_program,
            scan_depth,
            max_manifest_bytes,
            log_level,
        }
    }
}

impl FlatstageConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value is out of range or malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flatpak_program.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "flatpak program must not be empty".to_string(),
            ));
        }
        if self.builder_program.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "flatpak-builder program must not be empty".to_string(),
            ));
        }

        if self.scan_depth == 0 {
            return Err(ConfigError::ValidationFailed(
                "Scan depth must be at least 1".to_string(),
            ));
        }
        if self.scan_depth > 64 {
            return Err(ConfigError::ValidationFailed(
                "Scan depth cannot exceed 64".to_string(),
            ));
        }

        // Manifests are small declarative documents; anything huge is suspect
        if self.max_manifest_bytes < 1024 {
            return Err(ConfigError::ValidationFailed(
                "Manifest size limit must be at least 1KB".to_string(),
            ));
        }
        if self.max_manifest_bytes > 10_485_760 {
            return Err(ConfigError::ValidationFailed(
                "Manifest size limit cannot exceed 10MB".to_string(),
            ));
        }

        if self.arch.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Architecture must not be empty".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Root directory for all flatpak build state
    pub fn flatpak_root(&self) -> PathBuf {
        self.cache_dir.join("flatpak")
    }

    /// Converts configuration to a display map for output formatting
    pub fn to_display_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();

        map.insert(
            "cache_dir".to_string(),
            self.cache_dir.display().to_string(),
        );
        map.insert("arch".to_string(), self.arch.clone());
        map.insert("flatpak_program".to_string(), self.flatpak_program.clone());
        map.insert("builder_program".to_string(), self.builder_program.clone());
        map.insert("scan_depth".to_string(), self.scan_depth.to_string());
        map.insert(
            "max_manifest_bytes".to_string(),
            self.max_manifest_bytes.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for FlatstageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flatstage Configuration:")?;
        writeln!(f, "  Cache Dir: {}", self.cache_dir.display())?;
        writeln!(f, "  Arch: {}", self.arch)?;
        writeln!(f, "  Flatpak: {}", self.flatpak_program)?;
        writeln!(f, "  Builder: {}", self.builder_program)?;
        writeln!(f, "  Scan Depth: {}", self.scan_depth)?;
        writeln!(f, "  Manifest Limit: {} bytes", self.max_manifest_bytes)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::unset("FLATSTAGE_CACHE_DIR"),
            EnvGuard::unset("FLATSTAGE_ARCH"),
            EnvGuard::unset("FLATSTAGE_FLATPAK_BIN"),
            EnvGuard::unset("FLATSTAGE_BUILDER_BIN"),
            EnvGuard::unset("FLATSTAGE_SCAN_DEPTH"),
            EnvGuard::unset("FLATSTAGE_MANIFEST_LIMIT"),
            EnvGuard::unset("FLATSTAGE_LOG_LEVEL"),
        ];

        let config = FlatstageConfig::default();

        assert_eq!(config.flatpak_program, DEFAULT_FLATPAK_BIN);
        assert_eq!(config.builder_program, DEFAULT_BUILDER_BIN);
        assert_eq!(config.scan_depth, DEFAULT_SCAN_DEPTH);
        assert_eq!(config.max_manifest_bytes, DEFAULT_MANIFEST_LIMIT);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.arch, default_arch());
        assert!(config.cache_dir.ends_with("flatstage"));
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("FLATSTAGE_CACHE_DIR", "/tmp/flatstage-test"),
            EnvGuard::set("FLATSTAGE_ARCH", "aarch64"),
            EnvGuard::set("FLATSTAGE_FLATPAK_BIN", "/opt/bin/flatpak"),
            EnvGuard::set("FLATSTAGE_BUILDER_BIN", "/opt/bin/flatpak-builder"),
            EnvGuard::set("FLATSTAGE_SCAN_DEPTH", "3"),
            EnvGuard::set("FLATSTAGE_MANIFEST_LIMIT", "4096"),
            EnvGuard::set("FLATSTAGE_LOG_LEVEL", "debug"),
        ];

        let config = FlatstageConfig::default();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/flatstage-test"));
        assert_eq!(config.arch, "aarch64");
        assert_eq!(config.flatpak_program, "/opt/bin/flatpak");
        assert_eq!(config.builder_program, "/opt/bin/flatpak-builder");
        assert_eq!(config.scan_depth, 3);
        assert_eq!(config.max_manifest_bytes, 4096);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_invalid_numeric_env_falls_back() {
        let _guards = vec![
            EnvGuard::set("FLATSTAGE_SCAN_DEPTH", "not-a-number"),
            EnvGuard::set("FLATSTAGE_MANIFEST_LIMIT", "also-not"),
        ];

        let config = FlatstageConfig::default();

        assert_eq!(config.scan_depth, DEFAULT_SCAN_DEPTH);
        assert_eq!(config.max_manifest_bytes, DEFAULT_MANIFEST_LIMIT);
    }

    fn valid_config() -> FlatstageConfig {
        FlatstageConfig {
            cache_dir: PathBuf::from("/tmp/cache"),
            arch: "x86_64".to_string(),
            flatpak_program: "flatpak".to_string(),
            builder_program: "flatpak-builder".to_string(),
            scan_depth: 10,
            max_manifest_bytes: 262_144,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_configuration_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_configuration_validation_zero_depth() {
        let mut config = valid_config();
        config.scan_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configuration_validation_tiny_limit() {
        let mut config = valid_config();
        config.max_manifest_bytes = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configuration_validation_empty_program() {
        let mut config = valid_config();
        config.flatpak_program = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configuration_validation_invalid_log_level() {
        let mut config = valid_config();
        config.log_level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flatpak_root() {
        let config = valid_config();
        assert_eq!(config.flatpak_root(), PathBuf::from("/tmp/cache/flatpak"));
    }

    #[test]
    fn test_config_display() {
        let config = valid_config();
        let display = format!("{}", config);
        assert!(display.contains("Flatstage Configuration:"));
        assert!(display.contains("Arch:"));
    }

    #[test]
    fn test_display_map_contains_programs() {
        let map = valid_config().to_display_map();
        assert_eq!(map.get("flatpak_program").map(String::as_str), Some("flatpak"));
        assert!(map.contains_key("cache_dir"));
    }
}
