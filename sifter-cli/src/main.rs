//! Sifter: host-side control for companion-device sifter sync.
//!
//! # Usage
//!
//! ```text
//! sifter daemon start|stop|status
//! sifter add <name> [--rule <rule>]
//! sifter remove <id>
//! sifter list [--json]
//! sifter session foreground|background|handshake
//! sifter session select <token>
//! sifter session activate <handle>
//! sifter session notify <dict-json>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand,
    session::SessionCommand,
    sifter::{AddArgs, ListArgs, RemoveArgs},
};

#[derive(Parser, Debug)]
#[command(
    name = "sifter",
    version,
    about = "Manage sifters and push them to the companion device",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or query the host session daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Create a sifter in the running session.
    Add(AddArgs),

    /// Remove a sifter by id.
    Remove(RemoveArgs),

    /// Show sifters in registry order with their sync state.
    List(ListArgs),

    /// Drive the session lifecycle and simulate device notifications.
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Add(args) => args.run(),
        Commands::Remove(args) => args.run(),
        Commands::List(args) => args.run(),
        Commands::Session { command } => commands::session::run(command),
    }
}
