//! Flatpak manifest model and parser
//!
//! A manifest is the declarative JSON or YAML descriptor that names the
//! application, its runtime and SDK, and the modules to build. [`parse`]
//! turns a candidate file into a validated [`Manifest`] or rejects it
//! with a [`ManifestError`].

mod model;
mod parser;

pub use model::{BuildOptions, Manifest, ManifestFormat, Module, ModuleEntry};
pub use parser::{parse, parse_bytes, parse_with_limit, ManifestError, MANIFEST_SIZE_LIMIT};

/// Returns the build architecture as flatpak spells it
///
/// Flatpak uses `i386` where Rust reports `x86`; the 64-bit and ARM
/// names agree.
pub fn default_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i386",
        arch => arch,
    }
}
