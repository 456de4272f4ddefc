//! `sifter daemon`: host session lifecycle.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;

use sifter_daemon::paths::outbox_path;
use sifter_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::{home, print_json};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the session daemon in the foreground (session + socket server).
    Start,
    /// Request graceful shutdown over the Unix socket.
    Stop,
    /// Query daemon and session status over the Unix socket.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { socket }) => print_json(&json!({
                "running": false,
                "socket": socket.display().to_string(),
                "outbox": outbox_path(&home).display().to_string(),
            }))?,
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
