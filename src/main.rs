// Serverwave Registry - command-line entry point
// Inspect and repair the local server list

use clap::{Parser, Subcommand};
use serde::Serialize;
use serverwave_registry::commands::server::{self, RegistryState};
use serverwave_registry::{is_contained, RegistryConfig, RegistryError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "serverwave-registry", version, about = "Manage the local Serverwave server list")]
struct Cli {
    /// Root directory holding `config/` and `servers/` (defaults to ~/ServerWaveAnywhere)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every registered server
    List,
    /// Show one server
    Show { id: String },
    /// Remove a server from the list
    Remove {
        id: String,
        /// Keep the server directory on disk
        #[arg(long)]
        keep_data: bool,
    },
    /// Reload the list through the recovery chain and report where it came from
    Recover,
    /// Register server directories that have no entry
    AdoptOrphans,
    /// Print the command that would launch a server
    LaunchPlan { id: String },
    /// Check whether a path lies inside a root directory
    CheckPath { candidate: PathBuf, root: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_user_facing() {
                tracing::error!("Changes were not saved: {}", e);
            }
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RegistryError> {
    if let Command::CheckPath { candidate, root } = &cli.command {
        return print_json(&is_contained(candidate, root));
    }

    let config = match cli.home {
        Some(home) => RegistryConfig::with_root(home),
        None => RegistryConfig::from_env(),
    };
    let state = RegistryState::open(config)?;

    match cli.command {
        Command::List => print_json(&server::list_servers(&state).await),
        Command::Show { id } => print_json(&server::get_server(&state, &id).await?),
        Command::Remove { id, keep_data } => {
            print_json(&server::delete_server(&state, &id, Some(!keep_data)).await?)
        }
        Command::Recover => print_json(&server::reload_servers(&state).await),
        Command::AdoptOrphans => print_json(&server::adopt_orphaned_servers(&state).await?),
        Command::LaunchPlan { id } => print_json(&server::get_launch_plan(&state, &id).await?),
        Command::CheckPath { .. } => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), RegistryError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| RegistryError::Validation(e.to_string()))?;
    println!("{}", text);
    Ok(())
}
