//! `sifter add`, `sifter remove <id>`, `sifter list`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use sifter_core::{Sifter, SifterId, SyncState};
use sifter_daemon::{request_add, request_list, request_remove};

use super::{home, print_json, NOT_RUNNING_HINT};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display name shown on the host and as the device title.
    pub name: String,

    /// Rule definition, forwarded to the device verbatim.
    #[arg(long, short = 'r', default_value = "")]
    pub rule: String,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Sifter id as shown by `sifter list`.
    pub id: SifterId,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl AddArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let data = request_add(&home, self.name.clone(), self.rule)
            .with_context(|| format!("failed to add sifter '{}'; {NOT_RUNNING_HINT}", self.name))?;
        let id: SifterId =
            serde_json::from_value(data["id"].clone()).context("daemon returned no sifter id")?;
        println!("✓ Added sifter '{}' as {}", self.name, id);
        Ok(())
    }
}

impl RemoveArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let data = request_remove(&home, self.id.0)
            .with_context(|| format!("failed to remove sifter {}", self.id))?;
        let removed: Sifter = serde_json::from_value(data["removed"].clone())
            .context("daemon returned no removed sifter")?;
        println!("✓ Removed sifter '{}' ({})", removed.name, removed.id);
        Ok(())
    }
}

#[derive(Deserialize)]
struct ListPayload {
    sifters: Vec<Sifter>,
}

#[derive(Tabled)]
struct SifterRow {
    #[tabled(rename = "id")]
    id: SifterId,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "rule")]
    rule: String,
    #[tabled(rename = "sync")]
    sync: String,
    #[tabled(rename = "created")]
    created: String,
}

impl ListArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let data =
            request_list(&home).with_context(|| format!("failed to list sifters; {NOT_RUNNING_HINT}"))?;
        let payload: ListPayload =
            serde_json::from_value(data).context("failed to decode sifter list")?;

        if self.json {
            return print_json(&payload.sifters);
        }

        if payload.sifters.is_empty() {
            println!("No sifters configured.");
            println!("Run: sifter add <name> --rule <rule>");
            return Ok(());
        }

        let rows: Vec<SifterRow> = payload
            .sifters
            .iter()
            .map(|sifter| SifterRow {
                id: sifter.id,
                name: sifter.name.to_string(),
                rule: sifter.rule.clone(),
                sync: sync_marker(sifter.synced),
                created: sifter
                    .created_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn sync_marker(state: SyncState) -> String {
    let marker = match state {
        SyncState::Acknowledged => "■".green().bold(),
        SyncState::InFlight => "■".yellow().bold(),
        SyncState::Pending => "■".dimmed(),
    };
    format!("{marker} {state}")
}
