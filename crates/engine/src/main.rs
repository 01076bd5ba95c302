// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use pulsehub::config::Config;

#[derive(Parser)]
#[command(name = "pulsehub", version, about = "Dynamic profile engine for the PulseHub platform.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the engine service (reaper schedule + event boundary).
    Serve,
    /// Reaper operations.
    Reaper {
        #[command(subcommand)]
        command: ReaperCommands,
    },
    /// Counter operations.
    Counter {
        #[command(subcommand)]
        command: CounterCommands,
    },
}

#[derive(clap::Subcommand)]
enum ReaperCommands {
    /// Print the reaper status as JSON.
    Status,
    /// Trigger one reconciliation tick under the manual lease.
    Run,
}

#[derive(clap::Subcommand)]
enum CounterCommands {
    /// Re-scan the primary store, reset the counter, rebuild the expiry index.
    Reset,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    pulsehub::run::init_logging(&cli.config);

    match cli.subcommand {
        Some(Commands::Reaper { command: ReaperCommands::Status }) => {
            std::process::exit(pulsehub::command::reaper::status(&cli.config).await);
        }
        Some(Commands::Reaper { command: ReaperCommands::Run }) => {
            std::process::exit(pulsehub::command::reaper::run_manual(&cli.config).await);
        }
        Some(Commands::Counter { command: CounterCommands::Reset }) => {
            std::process::exit(pulsehub::command::counter::reset(&cli.config).await);
        }
        Some(Commands::Serve) | None => {
            if let Err(e) = pulsehub::run::serve(&cli.config).await {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
