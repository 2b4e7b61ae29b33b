//! Security Server Toolkit CLI.
//!
//! Reads the declarative configuration and brings every listed security
//! server up to it, one step at a time.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sstk_cli::commands::apply::ApplyCommand;
use sstk_cli::commands::auto::AutoCommand;
use sstk_cli::commands::operations::OperationsCommand;
use sstk_cli::commands::status::StatusCommand;
use sstk_cli::commands::validate::ValidateCommand;
use sstk_cli::config::{Config, DEFAULT_CONFIG_PATH};
use sstk_cli::OperationGraph;

/// Security Server Toolkit.
#[derive(Parser)]
#[command(
    name = "sstk",
    version,
    about = "Security server auto-configuration toolkit",
    long_about = "Configure security servers through their admin API.\n\n\
                  Every run probes each server, performs the next steps whose\n\
                  preconditions are met, and stops where an effect has not\n\
                  propagated yet. Re-run the same command to continue."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file.
    #[arg(short = 'c', long, global = true, env = "SSTK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    configfile: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Auto-configure every security server.
    Auto(AutoCommand),

    /// Show the status of every security server.
    Status(StatusCommand),

    /// Validate the configuration without contacting any server.
    Validate(ValidateCommand),

    /// Run a single operation.
    Apply(ApplyCommand),

    /// List operations in execution order.
    Operations(OperationsCommand),
}

fn init_tracing(verbose: bool, configured: Option<&str>) {
    let default = if verbose {
        "info,ss_admin=debug,sstk_cli=debug"
    } else {
        configured.unwrap_or("warn,sstk_cli=info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.configfile);
    init_tracing(
        cli.verbose,
        loaded
            .as_ref()
            .ok()
            .and_then(|config| config.logging.level.as_deref()),
    );

    let graph = OperationGraph::build();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Commands::Operations(cmd) => {
            cmd.run(&graph);
            Ok(())
        }
        Commands::Validate(cmd) => cmd.run(&loaded?, &graph),
        Commands::Auto(cmd) => cmd.run(&loaded?, &graph, &cancel).await,
        Commands::Status(cmd) => cmd.run(&loaded?, &graph, &cancel).await,
        Commands::Apply(cmd) => cmd.run(&loaded?, &graph, &cancel).await,
    }
}
