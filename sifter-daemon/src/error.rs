use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the session runtime, daemon protocol, and socket server.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] sifter_core::ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] sifter_core::RegistryError),

    #[error("projection error: {0}")]
    Project(#[from] sifter_ui::ProjectError),

    #[error("sync error: {0}")]
    Sync(#[from] sifter_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
