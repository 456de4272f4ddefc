//! `sifter session ...`: lifecycle transitions and device notifications.
//!
//! Without a paired device these commands stand in for the platform: they
//! move the host view between foreground and background, and inject the
//! dictionaries the device would send.

use anyhow::{Context, Result};
use clap::Subcommand;

use sifter_daemon::{request_activate, request_notify, request_select, request_simple};
use sifter_sync::parse_dictionary;

use super::{home, print_json, NOT_RUNNING_HINT};

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Bring the host view to the foreground (projects controls).
    Foreground,
    /// Send the host view to the background (releases controls).
    Background,
    /// Deliver a device handshake; starts a transfer when idle.
    Handshake,
    /// Deliver a device menu selection for the given token.
    Select {
        /// Selection token, i.e. the sifter id.
        token: String,
    },
    /// Activate a projected control by handle number.
    Activate {
        /// Control handle as listed under `session.controls` by
        /// `sifter daemon status`. Handles change whenever controls are
        /// re-projected.
        handle: u64,
    },
    /// Deliver a raw device dictionary, e.g. '{"3":1}'.
    Notify {
        dict: String,
    },
}

pub fn run(command: SessionCommand) -> Result<()> {
    let home = home()?;

    let data = match command {
        SessionCommand::Foreground => request_simple(&home, "foreground"),
        SessionCommand::Background => request_simple(&home, "background"),
        SessionCommand::Handshake => request_simple(&home, "handshake"),
        SessionCommand::Select { token } => request_select(&home, token),
        SessionCommand::Activate { handle } => request_activate(&home, handle),
        SessionCommand::Notify { dict } => {
            let dict = parse_dictionary(&dict).context("invalid device dictionary JSON")?;
            request_notify(&home, dict)
        }
    }
    .with_context(|| format!("session request failed; {NOT_RUNNING_HINT}"))?;

    print_json(&data)
}
