//! Batch ordering, abort-on-failure, and registry write-back tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rstest::rstest;
use sifter_core::{SifterId, SifterRegistry, SyncState};
use sifter_sync::{
    EncodeOptions, MessageKey, OutboundMessage, SyncError, SyncTransfer, TransferProgress,
    Transport, TransportError, TupleValue,
};
use tokio::sync::mpsc;

/// Replays a fixed script of per-message outcomes; records every attempt.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    attempts: Mutex<Vec<OutboundMessage>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<(), TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn attempted_ids(&self) -> Vec<SifterId> {
        self.attempts
            .lock()
            .expect("lock")
            .iter()
            .map(|m| m.sifter_id)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.attempts.lock().expect("lock").push(message.clone());
        self.script
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

fn registry_of(names: &[&str]) -> (SifterRegistry, Vec<SifterId>) {
    let mut registry = SifterRegistry::new();
    let ids = names
        .iter()
        .map(|n| registry.create(*n, format!("rule:{n}")).expect("create"))
        .collect();
    (registry, ids)
}

// ---------------------------------------------------------------------------
// 1. Abort semantics
// ---------------------------------------------------------------------------

#[test]
fn failure_on_second_of_three_keeps_only_first_synced() {
    let (mut registry, ids) = registry_of(&["one", "two", "three"]);
    let transport = ScriptedTransport::new(vec![Ok(()), Err(TransportError::TimedOut)]);
    let transfer = SyncTransfer::new(transport.clone(), EncodeOptions::default());

    let snapshot = SyncTransfer::begin(&mut registry);
    let report = transfer.run(&snapshot, None);
    report.apply_to(&mut registry);

    assert_eq!(transport.attempted_ids(), vec![ids[0], ids[1]], "sifter 3 never attempted");
    assert_eq!(report.acknowledged, vec![ids[0]]);
    assert_eq!(report.pending, vec![ids[1], ids[2]]);
    assert_eq!(registry.get(ids[0]).expect("1").synced, SyncState::Acknowledged);
    assert_eq!(registry.get(ids[1]).expect("2").synced, SyncState::Pending);
    assert_eq!(registry.get(ids[2]).expect("3").synced, SyncState::Pending);

    let failure = report.failure.clone().expect("aborted");
    assert_eq!(failure.index, 1);
    assert_eq!(failure.sifter_id, ids[1]);
    assert!(matches!(report.into_result(), Err(SyncError::TransferAborted(_))));
}

#[rstest]
#[case(TransportError::Disconnected)]
#[case(TransportError::TimedOut)]
#[case(TransportError::Rejected { reason: "dictionary full".into() })]
fn any_transport_error_aborts_remainder(#[case] error: TransportError) {
    let (mut registry, ids) = registry_of(&["a", "b", "c", "d"]);
    let transport = ScriptedTransport::new(vec![Err(error.clone())]);
    let transfer = SyncTransfer::new(transport.clone(), EncodeOptions::default());

    let snapshot = SyncTransfer::begin(&mut registry);
    let report = transfer.run(&snapshot, None);

    assert_eq!(transport.attempted_ids(), vec![ids[0]]);
    assert!(report.acknowledged.is_empty());
    assert_eq!(report.pending, ids);
    assert_eq!(report.failure.expect("aborted").source, error);
}

#[test]
fn full_success_marks_every_sifter_acknowledged() {
    let (mut registry, ids) = registry_of(&["a", "b", "c"]);
    let transport = ScriptedTransport::new(vec![]);
    let transfer = SyncTransfer::new(transport.clone(), EncodeOptions::default());

    let snapshot = SyncTransfer::begin(&mut registry);
    let report = transfer.run(&snapshot, None);
    assert_eq!(report.apply_to(&mut registry), 3);

    assert_eq!(transport.attempted_ids(), ids);
    assert!(registry.all().iter().all(|s| s.synced == SyncState::Acknowledged));
    assert_eq!(report.into_result().expect("success"), 3);
}

// ---------------------------------------------------------------------------
// 2. Snapshot isolation
// ---------------------------------------------------------------------------

#[test]
fn removal_during_transfer_keeps_send_order_and_write_back_is_safe() {
    let (mut registry, ids) = registry_of(&["a", "b", "c"]);
    let transport = ScriptedTransport::new(vec![]);
    let transfer = SyncTransfer::new(transport.clone(), EncodeOptions::default());

    let snapshot = SyncTransfer::begin(&mut registry);
    registry.remove(ids[1]).expect("remove mid-flight");
    let late = registry.create("late", "").expect("create");

    let report = transfer.run(&snapshot, None);
    let updated = report.apply_to(&mut registry);

    assert_eq!(transport.attempted_ids(), ids, "snapshot order, removed sifter still sent");
    assert_eq!(updated, 2, "removed sifter skipped on write-back");
    assert_eq!(registry.get(late).expect("late").synced, SyncState::Pending);
}

#[test]
fn messages_carry_rule_verbatim_and_truncated_title() {
    let mut registry = SifterRegistry::new();
    registry
        .create("a-very-long-sifter-name", "  raw rule\twith spacing ")
        .expect("create");
    let transport = ScriptedTransport::new(vec![]);
    let transfer = SyncTransfer::new(transport.clone(), EncodeOptions { title_max_chars: 6 });

    transfer.run(&registry.snapshot(), None);

    let attempts = transport.attempts.lock().expect("lock");
    assert_eq!(
        attempts[0].get(MessageKey::FullName),
        Some(&TupleValue::CString("a-very".into()))
    );
    assert_eq!(
        attempts[0].get(MessageKey::Rule),
        Some(&TupleValue::CString("  raw rule\twith spacing ".into()))
    );
}

// ---------------------------------------------------------------------------
// 3. Progress reporting
// ---------------------------------------------------------------------------

#[test]
fn progress_events_follow_send_order() {
    let (registry, ids) = registry_of(&["a", "b"]);
    let transport = ScriptedTransport::new(vec![Ok(()), Err(TransportError::Disconnected)]);
    let transfer = SyncTransfer::new(transport, EncodeOptions::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    transfer.run(&registry.snapshot(), Some(&tx));
    drop(tx);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            TransferProgress::Started { total: 2 },
            TransferProgress::Acknowledged { index: 0, sifter_id: ids[0] },
            TransferProgress::Failed {
                index: 1,
                sifter_id: ids[1],
                error: TransportError::Disconnected,
            },
        ]
    );
}
