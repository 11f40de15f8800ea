//! Fixed build phase ordering

use serde::Serialize;
use std::fmt;

/// The fixed, ordered buckets a build run advances through
///
/// Stages attach to a phase; the pipeline executes phases in this
/// declaration order and never reorders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Prepare,
    Downloads,
    Dependencies,
    BuildInit,
    Autogen,
    Configure,
    Build,
    Install,
    Commit,
    Export,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 10] = [
        Phase::Prepare,
        Phase::Downloads,
        Phase::Dependencies,
        Phase::BuildInit,
        Phase::Autogen,
        Phase::Configure,
        Phase::Build,
        Phase::Install,
        Phase::Commit,
        Phase::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Downloads => "downloads",
            Phase::Dependencies => "dependencies",
            Phase::BuildInit => "build-init",
            Phase::Autogen => "autogen",
            Phase::Configure => "configure",
            Phase::Build => "build",
            Phase::Install => "install",
            Phase::Commit => "commit",
            Phase::Export => "export",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
