use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::pipeline::Phase;

/// Manifest-driven flatpak build pipeline
#[derive(Parser, Debug)]
#[command(
    name = "flatstage",
    about = "Manifest-driven flatpak build pipeline",
    version,
    author,
    long_about = "flatstage discovers flatpak manifests in a project tree and drives the \
                  flatpak and flatpak-builder tools through a phase-ordered pipeline: \
                  runtimes are installed, dependency modules are built, and the staged \
                  application can be exported, bundled, or launched."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Verbose output (debug logging)")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Discover flatpak manifests in a project tree",
        long_about = "Recursively scans the project tree for manifest candidates, parses \
                      them, and lists the resulting build configurations.\n\n\
                      Examples:\n  \
                      flatstage discover\n  \
                      flatstage discover /path/to/project\n  \
                      flatstage discover --format json"
    )]
    Discover(DiscoverArgs),

    #[command(
        about = "Show the parsed fields of one manifest",
        long_about = "Parses a single manifest (or the project's default one) and prints \
                      its discovered fields: app id, runtime triplet, primary module, \
                      finish-args.\n\n\
                      Examples:\n  \
                      flatstage inspect\n  \
                      flatstage inspect --manifest org.example.App.json\n  \
                      flatstage inspect --format yaml"
    )]
    Inspect(InspectArgs),

    #[command(
        about = "Run the build pipeline up to a phase",
        long_about = "Runs the pipeline stages in phase order, skipping any stage whose \
                      output is already up to date.\n\n\
                      Examples:\n  \
                      flatstage build\n  \
                      flatstage build --through commit\n  \
                      flatstage build /path/to/project --manifest org.example.App.json"
    )]
    Build(BuildArgs),

    #[command(
        about = "Build and export the application to the local repo",
        long_about = "Runs the full pipeline through the export phase, committing the \
                      staged application into the per-branch OSTree repository.\n\n\
                      Examples:\n  \
                      flatstage export\n  \
                      flatstage export /path/to/project"
    )]
    Export(ExportArgs),

    #[command(
        about = "Build, export, and write a single-file bundle",
        long_about = "Runs the full pipeline and then writes a distributable .flatpak \
                      bundle from the exported repository.\n\n\
                      Examples:\n  \
                      flatstage bundle\n  \
                      flatstage bundle --output dist/app.flatpak"
    )]
    Bundle(BundleArgs),

    #[command(
        about = "Build and launch the staged application",
        long_about = "Builds through the commit phase and launches the manifest's command \
                      inside the staged sandbox. Arguments after -- go to the \
                      application.\n\n\
                      Examples:\n  \
                      flatstage run\n  \
                      flatstage run -- --help"
    )]
    Run(RunArgs),

    #[command(
        about = "Run a command inside the build sandbox",
        long_about = "Initializes the staging tree and dependency modules, then runs an \
                      arbitrary command in the build sandbox with the manifest's \
                      build-args and environment applied.\n\n\
                      Examples:\n  \
                      flatstage exec -- ninja -C _build\n  \
                      flatstage exec -- meson test -C _build"
    )]
    Exec(ExecArgs),

    #[command(
        about = "Remove the staging directory for this configuration",
        long_about = "Deletes the staging directory derived from the active manifest and \
                      branch, forcing the next build to start from a clean tree.\n\n\
                      Examples:\n  \
                      flatstage clean\n  \
                      flatstage clean --repos"
    )]
    Clean(CleanArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct DiscoverArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest to inspect (defaults to the project's best manifest)"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest to build (defaults to the project's best manifest)"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        default_value = "build",
        value_name = "PHASE",
        help = "Last phase to run"
    )]
    pub through: PhaseArg,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format for the run report"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest to build (defaults to the project's best manifest)"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format for the run report"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct BundleArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest to build (defaults to the project's best manifest)"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Bundle file to write (defaults to <app-id>.flatpak)"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        short = 'p',
        long,
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest to run (defaults to the project's best manifest)"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Arguments passed to the application"
    )]
    pub args: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ExecArgs {
    #[arg(
        short = 'p',
        long,
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest to use (defaults to the project's best manifest)"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Command to run inside the build sandbox"
    )]
    pub command: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct CleanArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub project: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest whose staging directory to remove"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(long, help = "Also remove the per-branch export repository")]
    pub repos: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseArg {
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

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Prepare => Phase::Prepare,
            PhaseArg::Downloads => Phase::Downloads,
            PhaseArg::Dependencies => Phase::Dependencies,
            PhaseArg::BuildInit => Phase::BuildInit,
            PhaseArg::Autogen => Phase::Autogen,
            PhaseArg::Configure => Phase::Configure,
            PhaseArg::Build => Phase::Build,
            PhaseArg::Install => Phase::Install,
            PhaseArg::Commit => Phase::Commit,
            PhaseArg::Export => Phase::Export,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        // Verify that CLI structure is valid
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_build_args() {
        let args = CliArgs::parse_from(["flatstage", "build"]);
        match args.command {
            Commands::Build(build_args) => {
                assert!(build_args.project.is_none());
                assert!(build_args.manifest.is_none());
                assert_eq!(build_args.through, PhaseArg::Build);
                assert_eq!(build_args.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_build_with_phase_and_path() {
        let args = CliArgs::parse_from([
            "flatstage",
            "build",
            "/tmp/project",
            "--through",
            "build-init",
            "--format",
            "json",
        ]);
        match args.command {
            Commands::Build(build_args) => {
                assert_eq!(build_args.project, Some(PathBuf::from("/tmp/project")));
                assert_eq!(build_args.through, PhaseArg::BuildInit);
                assert_eq!(build_args.format, OutputFormatArg::Json);
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_phase_arg_maps_onto_phase() {
        assert_eq!(Phase::from(PhaseArg::Prepare), Phase::Prepare);
        assert_eq!(Phase::from(PhaseArg::BuildInit), Phase::BuildInit);
        assert_eq!(Phase::from(PhaseArg::Export), Phase::Export);
    }

    #[test]
    fn test_discover_with_path() {
        let args = CliArgs::parse_from(["flatstage", "discover", "/tmp/project"]);
        match args.command {
            Commands::Discover(discover_args) => {
                assert_eq!(discover_args.project, Some(PathBuf::from("/tmp/project")));
                assert_eq!(discover_args.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Discover command"),
        }
    }

    #[test]
    fn test_inspect_with_manifest() {
        let args = CliArgs::parse_from([
            "flatstage",
            "inspect",
            "--manifest",
            "org.example.App.json",
            "--format",
            "yaml",
        ]);
        match args.command {
            Commands::Inspect(inspect_args) => {
                assert_eq!(
                    inspect_args.manifest,
                    Some(PathBuf::from("org.example.App.json"))
                );
                assert_eq!(inspect_args.format, OutputFormatArg::Yaml);
            }
            _ => panic!("Expected Inspect command"),
        }
    }

    #[test]
    fn test_bundle_with_output() {
        let args = CliArgs::parse_from(["flatstage", "bundle", "--output", "dist/app.flatpak"]);
        match args.command {
            Commands::Bundle(bundle_args) => {
                assert_eq!(bundle_args.output, Some(PathBuf::from("dist/app.flatpak")));
            }
            _ => panic!("Expected Bundle command"),
        }
    }

    #[test]
    fn test_run_collects_trailing_args() {
        let args = CliArgs::parse_from(["flatstage", "run", "--", "--version"]);
        match args.command {
            Commands::Run(run_args) => {
                assert_eq!(run_args.args, ["--version"]);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_exec_requires_command() {
        assert!(CliArgs::try_parse_from(["flatstage", "exec"]).is_err());

        let args = CliArgs::parse_from(["flatstage", "exec", "--", "ninja", "-C", "_build"]);
        match args.command {
            Commands::Exec(exec_args) => {
                assert_eq!(exec_args.command, ["ninja", "-C", "_build"]);
            }
            _ => panic!("Expected Exec command"),
        }
    }

    #[test]
    fn test_clean_repos_flag() {
        let args = CliArgs::parse_from(["flatstage", "clean", "--repos"]);
        match args.command {
            Commands::Clean(clean_args) => {
                assert!(clean_args.repos);
            }
            _ => panic!("Expected Clean command"),
        }
    }

    #[test]
    fn test_global_verbose_flag() {
        let args = CliArgs::parse_from(["flatstage", "-v", "build"]);
        assert!(args.verbose);
        assert!(!args.quiet);
    }

    #[test]
    fn test_global_quiet_conflicts_with_verbose() {
        assert!(CliArgs::try_parse_from(["flatstage", "-v", "-q", "build"]).is_err());
    }

    #[test]
    fn test_log_level_flag() {
        let args = CliArgs::parse_from(["flatstage", "--log-level", "debug", "discover"]);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }
}
