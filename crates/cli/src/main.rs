// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! ksictl: admin CLI for the ksid event runtime daemon.
//!
//! Thin by design — it owns no business logic, only request/response
//! round-trips over the same Unix-domain socket any other client uses.

mod client;
mod commands;
mod exit_error;

use clap::{Parser, Subcommand};
use exit_error::ExitError;

#[derive(Parser)]
#[command(name = "ksictl", about = "Admin CLI for the ksid event runtime daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon
    Start {
        /// Run in the foreground instead of detaching
        #[arg(long)]
        foreground: bool,
    },
    /// Request a graceful shutdown
    Stop,
    /// Reload the routing rule set from disk
    Reload,
    /// Print every pattern currently registered with the router
    Discover {
        /// Emit raw JSON instead of one pattern per line
        #[arg(long)]
        json: bool,
    },
    /// Print a snapshot of daemon activity
    Stats {
        /// Emit raw JSON instead of a formatted summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start { foreground } => commands::start::run(foreground).await,
        Command::Stop => commands::stop::run().await,
        Command::Reload => commands::reload::run().await,
        Command::Discover { json } => commands::discover::run(json).await,
        Command::Stats { json } => commands::stats::run(json).await,
    };

    if let Err(e) = result {
        exit_with_error(e);
    }
}

fn exit_with_error(e: ExitError) -> ! {
    eprintln!("ksictl: {e}");
    std::process::exit(e.code);
}
