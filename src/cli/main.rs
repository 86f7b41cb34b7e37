//! CLI binary entry point for songplay-warehouse

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use songplay_warehouse::cli::commands::pipeline::{
    PipelineArgs, handle_reset_schema, handle_run, handle_run_load,
};
#[cfg(feature = "cli")]
use songplay_warehouse::cli::commands::provision::{
    ProvisionArgs, handle_provision, handle_teardown,
};
#[cfg(feature = "cli")]
use songplay_warehouse::config::CONFIG_FILENAME;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "songplay-warehouse")]
#[command(about = "Full-refresh loader for the songplay star schema")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate the staging and warehouse tables
    ResetSchema,
    /// Stage the sources, then load dimensions and facts
    RunLoad,
    /// Reset the schema, then load
    Run,
    /// Create the IAM role and the Redshift cluster
    Provision,
    /// Delete the Redshift cluster and the IAM role
    Teardown,
}

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::ResetSchema => handle_reset_schema(&PipelineArgs { config: cli.config }),
        Commands::RunLoad => handle_run_load(&PipelineArgs { config: cli.config }),
        Commands::Run => handle_run(&PipelineArgs { config: cli.config }),
        Commands::Provision => handle_provision(&ProvisionArgs { config: cli.config }),
        Commands::Teardown => handle_teardown(&ProvisionArgs { config: cli.config }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
