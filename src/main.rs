use flatstage::cli::commands::{CliArgs, Commands};
use flatstage::cli::handlers::{
    handle_build, handle_bundle, handle_clean, handle_discover, handle_exec, handle_export,
    handle_inspect, handle_run,
};
use flatstage::util::logging::{init_logging, parse_level, LoggingConfig};
use flatstage::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("flatstage v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Discover(discover_args) => handle_discover(discover_args).await,
        Commands::Inspect(inspect_args) => handle_inspect(inspect_args).await,
        Commands::Build(build_args) => handle_build(build_args).await,
        Commands::Export(export_args) => handle_export(export_args).await,
        Commands::Bundle(bundle_args) => handle_bundle(bundle_args).await,
        Commands::Run(run_args) => handle_run(run_args).await,
        Commands::Exec(exec_args) => handle_exec(exec_args).await,
        Commands::Clean(clean_args) => handle_clean(clean_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("FLATSTAGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    init_logging(LoggingConfig::with_level(level));
}
