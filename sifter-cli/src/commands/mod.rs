pub mod daemon;
pub mod session;
pub mod sifter;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON output")?
    );
    Ok(())
}

pub(crate) const NOT_RUNNING_HINT: &str = "is the daemon running? start it with `sifter daemon start`";
