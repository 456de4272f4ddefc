//! Transport seam: the pairing SDK sits behind [`Transport`].
//!
//! `send` blocks until the device acknowledges the message or the transport
//! gives up. No timeout is imposed here; transports surface their own.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::error::{io_err, SyncError};
use crate::message::OutboundMessage;

/// Per-message failure. Any of these aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device rejected message: {reason}")]
    Rejected { reason: String },

    #[error("device did not acknowledge in time")]
    TimedOut,

    #[error("device disconnected")]
    Disconnected,

    #[error("transport I/O failure: {0}")]
    Io(String),
}

/// Ordered, acknowledged delivery of sifter messages to the device.
pub trait Transport: Send + Sync {
    /// Send one message and wait for its acknowledgment.
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

/// Device-less transport: appends each message as one JSON line to a file.
/// A flushed write counts as the acknowledgment.
pub struct OutboxTransport {
    path: PathBuf,
    file: Mutex<File>,
}

impl OutboxTransport {
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for OutboxTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| TransportError::Rejected { reason: e.to_string() })?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| TransportError::Io("outbox lock poisoned".to_string()))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| match e.kind() {
                ErrorKind::BrokenPipe | ErrorKind::NotConnected => TransportError::Disconnected,
                _ => TransportError::Io(e.to_string()),
            })?;
        tracing::trace!(path = %self.path.display(), sifter_id = %message.sifter_id, "outbox write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{encode, EncodeOptions};
    use sifter_core::{Sifter, SifterId};
    use tempfile::TempDir;

    #[test]
    fn outbox_appends_one_json_line_per_message() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("outbox.jsonl");
        let transport = OutboxTransport::open(&path).expect("open");

        for id in 1..=2 {
            let sifter = Sifter::new(SifterId(id), format!("s{id}"), "");
            transport
                .send(&encode(&sifter, &EncodeOptions::default()))
                .expect("send");
        }

        let contents = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<OutboundMessage> = contents
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].sifter_id, SifterId(1));
        assert_eq!(lines[1].sifter_id, SifterId(2));
    }
}
