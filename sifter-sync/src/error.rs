//! Error types for sifter-sync.

use std::path::PathBuf;

use thiserror::Error;

use sifter_core::SifterId;

use crate::transport::TransportError;

/// A batch stopped at its first failed message. Everything before `index` was
/// acknowledged; `index` and everything after it was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer aborted at position {index} (sifter {sifter_id}): {source}")]
pub struct TransferAborted {
    pub index: usize,
    pub sifter_id: SifterId,
    #[source]
    pub source: TransportError,
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure mid-batch; the remainder was skipped.
    #[error(transparent)]
    TransferAborted(#[from] TransferAborted),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Message (de)serialization error.
    #[error("message JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
