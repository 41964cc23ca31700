//! Matchcast: live match state sync.
//!
//! # Usage
//!
//! ```text
//! matchcast daemon start|stop|status
//! matchcast publish [TENANT] [--match-data JSON] [--overlays JSON]
//! matchcast wagons [TENANT] JSON_ARRAY
//! matchcast snapshot [TENANT]
//! matchcast watch [TENANT] [--raw]
//! matchcast status [--json]
//! ```
//!
//! Every command except `daemon start` talks to a running daemon over
//! `~/.matchcast/daemon.sock`. An omitted or blank tenant means `default`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand,
    publish::{PublishArgs, WagonsArgs},
    snapshot::SnapshotArgs,
    status::StatusArgs,
    watch::WatchArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "matchcast",
    version,
    about = "Per-tenant live match state sync over a local daemon",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Merge matchData and/or overlays into a tenant's document.
    Publish(PublishArgs),

    /// Replace a tenant's wagon sequence.
    Wagons(WagonsArgs),

    /// Print a tenant's current document.
    Snapshot(SnapshotArgs),

    /// Join a tenant and follow its updates.
    Watch(WatchArgs),

    /// Show tenants, subscribers and pending updates.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Publish(args) => args.run(),
        Commands::Wagons(args) => args.run(),
        Commands::Snapshot(args) => args.run(),
        Commands::Watch(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
