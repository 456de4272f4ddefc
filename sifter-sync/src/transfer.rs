//! Ordered bulk transfer of a registry snapshot to the device.
//!
//! ## Batch protocol
//!
//! 1. The interactive side calls [`SyncTransfer::begin`]: snapshot the registry,
//!    mark every captured sifter `InFlight`.
//! 2. A blocking worker calls [`SyncTransfer::run`]: encode and send in snapshot
//!    order, one acknowledgment at a time.
//! 3. The first failure aborts the rest. Nothing after it is attempted, so the
//!    device never sees a reordered or gapped batch.
//! 4. The interactive side calls [`TransferReport::apply_to`]: acknowledged
//!    prefix → `Acknowledged`, the rest → `Pending`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use sifter_core::{SifterId, SifterRegistry, Snapshot, SyncState};

use crate::error::{SyncError, TransferAborted};
use crate::message::{encode, EncodeOptions};
use crate::transport::{Transport, TransportError};

/// Progress events emitted while a batch is being sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferProgress {
    Started { total: usize },
    Acknowledged { index: usize, sifter_id: SifterId },
    Failed { index: usize, sifter_id: SifterId, error: TransportError },
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Acknowledged sifters, in send order.
    pub acknowledged: Vec<SifterId>,
    /// The failed sifter and everything after it.
    pub pending: Vec<SifterId>,
    pub failure: Option<TransferAborted>,
    pub duration: Duration,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn sent(&self) -> usize {
        self.acknowledged.len()
    }

    pub fn into_result(self) -> Result<usize, SyncError> {
        match self.failure {
            Some(aborted) => Err(aborted.into()),
            None => Ok(self.acknowledged.len()),
        }
    }

    /// Write the outcome back into the registry.
    ///
    /// Sifters removed while the batch was in flight are skipped (logged by
    /// the registry). Returns how many sifters were updated.
    pub fn apply_to(&self, registry: &mut SifterRegistry) -> usize {
        let acknowledged = self
            .acknowledged
            .iter()
            .filter(|id| registry.mark_synced(**id, SyncState::Acknowledged))
            .count();
        let reset = self
            .pending
            .iter()
            .filter(|id| registry.mark_synced(**id, SyncState::Pending))
            .count();
        acknowledged + reset
    }
}

/// Sends snapshots over a shared transport.
#[derive(Clone)]
pub struct SyncTransfer {
    transport: Arc<dyn Transport>,
    options: EncodeOptions,
}

impl SyncTransfer {
    pub fn new(transport: Arc<dyn Transport>, options: EncodeOptions) -> Self {
        Self { transport, options }
    }

    /// Capture the registry and mark the captured sifters `InFlight`.
    pub fn begin(registry: &mut SifterRegistry) -> Snapshot {
        let snapshot = registry.snapshot();
        for sifter in snapshot.iter() {
            registry.mark_synced(sifter.id, SyncState::InFlight);
        }
        snapshot
    }

    /// Send `snapshot` in order. Blocks on the transport; run it off the
    /// interactive task.
    ///
    /// An empty snapshot completes immediately with zero messages sent.
    pub fn run(
        &self,
        snapshot: &Snapshot,
        progress: Option<&UnboundedSender<TransferProgress>>,
    ) -> TransferReport {
        let started = Instant::now();
        let emit = |event: TransferProgress| {
            if let Some(tx) = progress {
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(event);
            }
        };

        emit(TransferProgress::Started { total: snapshot.len() });
        tracing::debug!(total = snapshot.len(), "transfer started");

        let mut acknowledged = Vec::with_capacity(snapshot.len());
        for (index, sifter) in snapshot.iter().enumerate() {
            let message = encode(sifter, &self.options);
            match self.transport.send(&message) {
                Ok(()) => {
                    acknowledged.push(sifter.id);
                    emit(TransferProgress::Acknowledged {
                        index,
                        sifter_id: sifter.id,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        index,
                        sifter_id = %sifter.id,
                        error = %error,
                        skipped = snapshot.len() - index - 1,
                        "transfer aborted",
                    );
                    emit(TransferProgress::Failed {
                        index,
                        sifter_id: sifter.id,
                        error: error.clone(),
                    });
                    return TransferReport {
                        acknowledged,
                        pending: snapshot[index..].iter().map(|s| s.id).collect(),
                        failure: Some(TransferAborted {
                            index,
                            sifter_id: sifter.id,
                            source: error,
                        }),
                        duration: started.elapsed(),
                    };
                }
            }
        }

        tracing::debug!(sent = acknowledged.len(), "transfer completed");
        TransferReport {
            acknowledged,
            pending: Vec::new(),
            failure: None,
            duration: started.elapsed(),
        }
    }
}
