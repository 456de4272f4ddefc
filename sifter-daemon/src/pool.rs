//! Bounded pool of blocking transfer workers.
//!
//! Each job runs [`SyncTransfer::run`] on tokio's blocking pool once it holds a
//! semaphore permit. Progress and the final report travel back to the session
//! over channels; workers never touch session state.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use sifter_core::{SifterId, Snapshot};
use sifter_sync::{SyncTransfer, TransferProgress, TransferReport};

/// One submitted batch.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub transfer_id: u64,
    pub snapshot: Snapshot,
}

/// Completion of one job. `Err` carries a worker failure (e.g. a panicking
/// transport), not a transport error; those live in the report.
#[derive(Debug)]
pub struct TransferOutcome {
    pub transfer_id: u64,
    pub snapshot_ids: Vec<SifterId>,
    pub result: Result<TransferReport, String>,
}

pub struct TransferPool {
    transfer: SyncTransfer,
    permits: Arc<Semaphore>,
    progress: mpsc::UnboundedSender<TransferProgress>,
    completions: mpsc::UnboundedSender<TransferOutcome>,
}

impl TransferPool {
    pub fn new(
        transfer: SyncTransfer,
        workers: usize,
        progress: mpsc::UnboundedSender<TransferProgress>,
        completions: mpsc::UnboundedSender<TransferOutcome>,
    ) -> Self {
        Self {
            transfer,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            progress,
            completions,
        }
    }

    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn submit(&self, job: TransferJob) -> JoinHandle<()> {
        let transfer = self.transfer.clone();
        let permits = self.permits.clone();
        let progress = self.progress.clone();
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let TransferJob {
                transfer_id,
                snapshot,
            } = job;
            let snapshot_ids = snapshot.ids();

            let result = match permits.acquire_owned().await {
                Ok(_permit) => tokio::task::spawn_blocking(move || {
                    transfer.run(&snapshot, Some(&progress))
                })
                .await
                .map_err(|err| format!("transfer worker join error: {err}")),
                Err(err) => Err(format!("transfer pool closed: {err}")),
            };

            let outcome = TransferOutcome {
                transfer_id,
                snapshot_ids,
                result,
            };
            if completions.send(outcome).is_err() {
                tracing::warn!(transfer_id, "session gone before transfer completion");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_core::{Sifter, SifterId};
    use sifter_sync::{EncodeOptions, OutboundMessage, Transport, TransportError};

    struct Panicking;

    impl Transport for Panicking {
        fn send(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
            panic!("transport blew up");
        }
    }

    /// Accepts the first message, then panics.
    struct PanicsOnSecond(std::sync::atomic::AtomicUsize);

    impl Transport for PanicsOnSecond {
        fn send(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
            if self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 1 {
                panic!("transport blew up");
            }
            Ok(())
        }
    }

    struct Accepting;

    impl Transport for Accepting {
        fn send(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn pool(
        transport: Arc<dyn Transport>,
        workers: usize,
    ) -> (TransferPool, mpsc::UnboundedReceiver<TransferOutcome>) {
        let (pool, _progress, rx) = observed_pool(transport, workers);
        (pool, rx)
    }

    fn observed_pool(
        transport: Arc<dyn Transport>,
        workers: usize,
    ) -> (
        TransferPool,
        mpsc::UnboundedReceiver<TransferProgress>,
        mpsc::UnboundedReceiver<TransferOutcome>,
    ) {
        let (progress, progress_rx) = mpsc::unbounded_channel();
        let (completions, rx) = mpsc::unbounded_channel();
        let transfer = SyncTransfer::new(transport, EncodeOptions::default());
        (
            TransferPool::new(transfer, workers, progress, completions),
            progress_rx,
            rx,
        )
    }

    fn snapshot(ids: &[u64]) -> Snapshot {
        ids.iter()
            .map(|id| Sifter::new(SifterId(*id), format!("s{id}"), ""))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn zero_workers_is_clamped_to_one() {
        let (pool, _rx) = pool(Arc::new(Accepting), 0);
        assert_eq!(pool.available_workers(), 1);
    }

    #[tokio::test]
    async fn completion_carries_report_and_snapshot_ids() {
        let (pool, mut rx) = pool(Arc::new(Accepting), 1);
        pool.submit(TransferJob {
            transfer_id: 3,
            snapshot: snapshot(&[1, 2]),
        })
        .await
        .expect("job task");

        let outcome = rx.recv().await.expect("outcome");
        assert_eq!(outcome.transfer_id, 3);
        assert_eq!(outcome.snapshot_ids, vec![SifterId(1), SifterId(2)]);
        assert_eq!(outcome.result.expect("report").sent(), 2);
    }

    #[tokio::test]
    async fn panicking_worker_becomes_error_outcome() {
        let (pool, mut rx) = pool(Arc::new(Panicking), 1);
        pool.submit(TransferJob {
            transfer_id: 1,
            snapshot: snapshot(&[7]),
        })
        .await
        .expect("job task");

        let outcome = rx.recv().await.expect("outcome");
        assert_eq!(outcome.snapshot_ids, vec![SifterId(7)]);
        assert!(outcome.result.unwrap_err().contains("join error"));
    }

    #[tokio::test]
    async fn acknowledgements_before_a_panic_are_queued_ahead_of_the_outcome() {
        let transport = Arc::new(PanicsOnSecond(Default::default()));
        let (pool, mut progress, mut rx) = observed_pool(transport, 1);
        pool.submit(TransferJob {
            transfer_id: 1,
            snapshot: snapshot(&[4, 5, 6]),
        })
        .await
        .expect("job task");

        let outcome = rx.recv().await.expect("outcome");
        assert!(outcome.result.is_err());

        let mut acknowledged = Vec::new();
        while let Ok(update) = progress.try_recv() {
            if let TransferProgress::Acknowledged { sifter_id, .. } = update {
                acknowledged.push(sifter_id);
            }
        }
        assert_eq!(acknowledged, vec![SifterId(4)]);
    }
}
