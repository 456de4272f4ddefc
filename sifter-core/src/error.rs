//! Error types for sifter-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SifterId;

/// Entity-level registry failures. Never fatal to the registry itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// `add` with an identifier that is already registered; registry unchanged.
    #[error("sifter {id} is already registered")]
    DuplicateIdentifier { id: SifterId },

    /// `remove` / `mark_synced` / lookup of an identifier that is not registered.
    #[error("sifter {id} not found")]
    NotFound { id: SifterId },

    /// The allocator reached `u64::MAX`; no identifier can be handed out.
    #[error("sifter identifiers exhausted")]
    IdentifiersExhausted,
}

/// Errors from loading `~/.sifter/` configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure other than "file missing".
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A semantically invalid value (e.g. zero workers).
    #[error("invalid config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.sifter/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
