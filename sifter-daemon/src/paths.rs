use std::path::{Path, PathBuf};

pub use sifter_core::config::sifter_root;

pub const DAEMON_LABEL: &str = "dev.sifter.daemon";
pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const OUTBOX_FILE: &str = "outbox.jsonl";

pub fn socket_path(home: &Path) -> PathBuf {
    sifter_root(home).join(DAEMON_SOCKET)
}

/// Where the device-less transport appends outbound messages.
pub fn outbox_path(home: &Path) -> PathBuf {
    sifter_root(home).join(OUTBOX_FILE)
}
