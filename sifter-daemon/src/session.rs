//! Session lifecycle: the interactive context.
//!
//! One tokio task owns the registry, the UI projector, and the handshake
//! monitor. Everything else talks to it through [`SessionHandle`]: lifecycle
//! transitions, device notifications, and UI-layer registry edits arrive as
//! [`SessionEvent`]s; observers receive [`SessionNotice`]s on a broadcast
//! channel.
//!
//! Transfers run on the [`TransferPool`]; their completion comes back as a
//! [`TransferOutcome`] and is the only path that writes sync state.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use sifter_core::{
    RegistryError, SeedSifter, SessionConfig, Sifter, SifterId, SifterRegistry, SyncState,
};
use sifter_sync::{Notification, SyncTransfer, TransferProgress};
use sifter_ui::{
    ControlBinding, ControlHandle, LabelTemplate, RenderToolkit, TextToolkit, UiProjector,
};

use crate::error::DaemonError;
use crate::monitor::{HandshakeDecision, HandshakeMonitor, MonitorState};
use crate::pool::{TransferJob, TransferOutcome, TransferPool};

const NOTICE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Events, notices, status
// ---------------------------------------------------------------------------

pub enum SessionEvent {
    Foreground,
    Background,
    Notify(Notification),
    AddSifter {
        name: String,
        rule: String,
        respond_to: oneshot::Sender<Result<SifterId, RegistryError>>,
    },
    RemoveSifter {
        id: SifterId,
        respond_to: oneshot::Sender<Result<Sifter, RegistryError>>,
    },
    ActivateControl {
        handle: ControlHandle,
        respond_to: oneshot::Sender<Result<SifterId, String>>,
    },
    List {
        respond_to: oneshot::Sender<Vec<Sifter>>,
    },
    Status {
        respond_to: oneshot::Sender<SessionStatus>,
    },
    Shutdown,
}

/// Outcome of the most recent finished transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub transfer_id: u64,
    pub sent: usize,
    pub pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub duration_ms: u128,
    pub finished_at_unix: u64,
}

impl TransferSummary {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Observable session happenings, for the UI layer and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum SessionNotice {
    ControlsProjected { controls: usize },
    ControlsReleased { released: usize },
    HandshakeQueued,
    HandshakeCoalesced { total: u64 },
    TransferStarted { transfer_id: u64, total: usize },
    SifterAcknowledged { sifter_id: SifterId },
    TransferCompleted(TransferSummary),
    TransferFailed(TransferSummary),
    Activated { sifter_id: SifterId },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub foreground: bool,
    pub monitor: MonitorState,
    pub pending_handshake: bool,
    pub coalesced_handshakes: u64,
    pub transfers: u64,
    pub sifters: usize,
    pub synced: usize,
    /// Projected controls, in registry order. Empty while backgrounded.
    pub controls: Vec<ControlBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transfer: Option<TransferSummary>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap, clonable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub async fn foreground(&self) -> Result<(), DaemonError> {
        self.send(SessionEvent::Foreground).await
    }

    pub async fn background(&self) -> Result<(), DaemonError> {
        self.send(SessionEvent::Background).await
    }

    pub async fn notify(&self, notification: Notification) -> Result<(), DaemonError> {
        self.send(SessionEvent::Notify(notification)).await
    }

    pub async fn handshake(&self) -> Result<(), DaemonError> {
        self.notify(Notification::Handshake).await
    }

    pub async fn add_sifter(
        &self,
        name: impl Into<String>,
        rule: impl Into<String>,
    ) -> Result<SifterId, DaemonError> {
        let (name, rule) = (name.into(), rule.into());
        let id = self
            .request(|respond_to| SessionEvent::AddSifter {
                name,
                rule,
                respond_to,
            })
            .await?;
        Ok(id?)
    }

    pub async fn remove_sifter(&self, id: SifterId) -> Result<Sifter, DaemonError> {
        let removed = self
            .request(|respond_to| SessionEvent::RemoveSifter { id, respond_to })
            .await?;
        Ok(removed?)
    }

    pub async fn activate_control(&self, handle: ControlHandle) -> Result<SifterId, DaemonError> {
        self.request(|respond_to| SessionEvent::ActivateControl { handle, respond_to })
            .await?
            .map_err(DaemonError::Protocol)
    }

    pub async fn list(&self) -> Result<Vec<Sifter>, DaemonError> {
        self.request(|respond_to| SessionEvent::List { respond_to })
            .await
    }

    pub async fn status(&self) -> Result<SessionStatus, DaemonError> {
        self.request(|respond_to| SessionEvent::Status { respond_to })
            .await
    }

    /// Ask the session to stop. An in-flight transfer is allowed to finish.
    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        self.send(SessionEvent::Shutdown).await
    }

    async fn send(&self, event: SessionEvent) -> Result<(), DaemonError> {
        self.events
            .send(event)
            .await
            .map_err(|_| DaemonError::ChannelClosed("session events"))
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> SessionEvent,
    ) -> Result<R, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await
            .map_err(|_| DaemonError::ChannelClosed("session response"))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session<T: RenderToolkit> {
    registry: SifterRegistry,
    projector: UiProjector<T>,
    monitor: HandshakeMonitor,
    pool: TransferPool,
    notices: broadcast::Sender<SessionNotice>,
    foreground: bool,
    pending_handshake: bool,
    next_transfer_id: u64,
    /// Sifters the running transfer has reported as acknowledged so far.
    acknowledged_in_flight: Vec<SifterId>,
    last_transfer: Option<TransferSummary>,
}

/// Spawn a session on the current runtime with the in-process text toolkit.
pub fn spawn(
    config: &SessionConfig,
    transfer: SyncTransfer,
    seed: Vec<SeedSifter>,
) -> Result<(SessionHandle, JoinHandle<()>), DaemonError> {
    Session::spawn(config, TextToolkit::default(), transfer, seed)
}

impl<T: RenderToolkit + 'static> Session<T> {
    /// Build the session, load `seed` into a fresh registry, and start the
    /// event loop. The registry lives exactly as long as the returned task.
    pub fn spawn(
        config: &SessionConfig,
        toolkit: T,
        transfer: SyncTransfer,
        seed: Vec<SeedSifter>,
    ) -> Result<(SessionHandle, JoinHandle<()>), DaemonError> {
        let labels = LabelTemplate::new(&config.label_template)?;
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(config.event_queue);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut registry = SifterRegistry::new();
        for entry in seed {
            if let Err(err) = registry.create(entry.name, entry.rule) {
                tracing::warn!(error = %err, "seed loading stopped");
                break;
            }
        }

        let mut projector = UiProjector::new(toolkit, labels);
        let activation_notices = notices.clone();
        projector.set_activation_handler(Box::new(move |sifter_id| {
            tracing::info!(sifter_id = %sifter_id, "sifter activated");
            let _ = activation_notices.send(SessionNotice::Activated { sifter_id });
        }));

        let session = Session {
            registry,
            projector,
            monitor: HandshakeMonitor::new(),
            pool: TransferPool::new(
                transfer,
                config.transfer_workers,
                progress_tx,
                completions_tx,
            ),
            notices: notices.clone(),
            foreground: false,
            pending_handshake: false,
            next_transfer_id: 0,
            acknowledged_in_flight: Vec::new(),
            last_transfer: None,
        };

        tracing::info!(
            sifters = session.registry.len(),
            workers = session.pool.available_workers(),
            "session started",
        );
        let task = tokio::spawn(session.run(events_rx, progress_rx, completions_rx));
        Ok((
            SessionHandle {
                events: events_tx,
                notices,
            },
            task,
        ))
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        mut progress: mpsc::UnboundedReceiver<TransferProgress>,
        mut completions: mpsc::UnboundedReceiver<TransferOutcome>,
    ) {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    match event {
                        Some(SessionEvent::Shutdown) | None => break,
                        Some(event) => self.handle_event(event),
                    }
                }
                Some(update) = progress.recv() => self.on_progress(update),
                Some(outcome) = completions.recv() => {
                    self.drain_progress(&mut progress);
                    self.on_completion(outcome);
                }
            }
        }

        // A half-sent batch is worse than a finished one: wait it out.
        if self.monitor.state() == MonitorState::Dispatched {
            tracing::info!("waiting for in-flight transfer before session teardown");
            if let Some(outcome) = completions.recv().await {
                self.drain_progress(&mut progress);
                self.on_completion(outcome);
            }
        }

        self.projector.release();
        tracing::info!(sifters = self.registry.len(), "session ended");
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Foreground => self.on_foreground(),
            SessionEvent::Background => self.on_background(),
            SessionEvent::Notify(notification) => self.on_notification(notification),
            SessionEvent::AddSifter {
                name,
                rule,
                respond_to,
            } => {
                let created = self.registry.create(name, rule);
                match &created {
                    Ok(_) => self.refresh_controls(),
                    Err(err) => tracing::warn!(error = %err, "add rejected"),
                }
                let _ = respond_to.send(created);
            }
            SessionEvent::RemoveSifter { id, respond_to } => {
                let removed = self.registry.remove(id);
                match &removed {
                    Ok(_) => self.refresh_controls(),
                    Err(err) => tracing::warn!(sifter_id = %id, error = %err, "remove ignored"),
                }
                let _ = respond_to.send(removed);
            }
            SessionEvent::ActivateControl { handle, respond_to } => {
                let result = self.projector.activate(handle).map_err(|e| e.to_string());
                let _ = respond_to.send(result);
            }
            SessionEvent::List { respond_to } => {
                let _ = respond_to.send(self.registry.all().to_vec());
            }
            SessionEvent::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            SessionEvent::Shutdown => {}
        }
    }

    // -- lifecycle ----------------------------------------------------------

    fn on_foreground(&mut self) {
        self.foreground = true;
        self.project();
        if self.pending_handshake {
            self.pending_handshake = false;
            tracing::info!("replaying handshake received while backgrounded");
            self.on_handshake();
        }
    }

    fn on_background(&mut self) {
        self.foreground = false;
        let released = self.projector.release();
        let _ = self.notices.send(SessionNotice::ControlsReleased { released });
    }

    fn project(&mut self) {
        match self.projector.project(self.registry.all()) {
            Ok(projection) => {
                if projection.empty {
                    tracing::debug!("no sifters configured; next handshake pushes an empty batch");
                }
                let _ = self.notices.send(SessionNotice::ControlsProjected {
                    controls: projection.controls,
                });
            }
            Err(err) => tracing::error!(error = %err, "control projection failed"),
        }
    }

    /// Re-project only while visible; hidden views hold no controls.
    fn refresh_controls(&mut self) {
        if self.foreground {
            self.project();
        }
    }

    // -- device notifications ----------------------------------------------

    fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Resume => tracing::debug!("resume notification"),
            Notification::Handshake if self.foreground => self.on_handshake(),
            Notification::Handshake => {
                if self.pending_handshake {
                    tracing::debug!("handshake already queued while backgrounded");
                } else {
                    self.pending_handshake = true;
                    tracing::info!("handshake queued until foreground");
                    let _ = self.notices.send(SessionNotice::HandshakeQueued);
                }
            }
            Notification::Select { token } => self.on_select(&token),
        }
    }

    fn on_select(&mut self, token: &str) {
        let id = match token.parse::<SifterId>() {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(token, error = %err, "device selection with malformed token");
                return;
            }
        };
        if !self.registry.contains(id) {
            tracing::warn!(
                error = %RegistryError::NotFound { id },
                "device selected an unknown sifter",
            );
            return;
        }
        self.projector.dispatch_activation(id);
    }

    fn on_handshake(&mut self) {
        match self.monitor.on_handshake() {
            HandshakeDecision::Dispatch => self.dispatch(),
            HandshakeDecision::Coalesced => {
                let _ = self.notices.send(SessionNotice::HandshakeCoalesced {
                    total: self.monitor.coalesced(),
                });
            }
        }
    }

    // -- transfers ------------------------------------------------------------

    fn dispatch(&mut self) {
        let snapshot = SyncTransfer::begin(&mut self.registry);
        self.next_transfer_id += 1;
        let transfer_id = self.next_transfer_id;
        let total = snapshot.len();

        self.pool.submit(TransferJob {
            transfer_id,
            snapshot,
        });
        self.monitor.mark_dispatched();
        tracing::info!(transfer_id, total, "transfer dispatched");
        let _ = self
            .notices
            .send(SessionNotice::TransferStarted { transfer_id, total });
        self.refresh_controls();
    }

    fn on_progress(&mut self, update: TransferProgress) {
        match update {
            TransferProgress::Started { .. } => self.acknowledged_in_flight.clear(),
            TransferProgress::Acknowledged { sifter_id, .. } => {
                self.acknowledged_in_flight.push(sifter_id);
                let _ = self
                    .notices
                    .send(SessionNotice::SifterAcknowledged { sifter_id });
            }
            TransferProgress::Failed { .. } => {}
        }
    }

    /// Progress is sent before the completion it belongs to; consume what is
    /// queued so acknowledgements land before the transfer is closed out.
    fn drain_progress(&mut self, progress: &mut mpsc::UnboundedReceiver<TransferProgress>) {
        while let Ok(update) = progress.try_recv() {
            self.on_progress(update);
        }
    }

    fn on_completion(&mut self, outcome: TransferOutcome) {
        let TransferOutcome {
            transfer_id,
            snapshot_ids,
            result,
        } = outcome;

        let acknowledged = std::mem::take(&mut self.acknowledged_in_flight);
        let summary = match result {
            Ok(report) => {
                report.apply_to(&mut self.registry);
                TransferSummary {
                    transfer_id,
                    sent: report.sent(),
                    pending: report.pending.len(),
                    failure: report.failure.as_ref().map(ToString::to_string),
                    duration_ms: report.duration.as_millis(),
                    finished_at_unix: unix_seconds_now(),
                }
            }
            Err(err) => {
                // The worker died mid-batch: what the device confirmed stays
                // acknowledged, the rest goes back to pending.
                let (sent, pending): (Vec<SifterId>, Vec<SifterId>) = snapshot_ids
                    .into_iter()
                    .partition(|id| acknowledged.contains(id));
                for id in &sent {
                    self.registry.mark_synced(*id, SyncState::Acknowledged);
                }
                for id in &pending {
                    self.registry.mark_synced(*id, SyncState::Pending);
                }
                TransferSummary {
                    transfer_id,
                    sent: sent.len(),
                    pending: pending.len(),
                    failure: Some(err),
                    duration_ms: 0,
                    finished_at_unix: unix_seconds_now(),
                }
            }
        };

        self.monitor.completed();
        let notice = if summary.is_success() {
            tracing::info!(transfer_id, sent = summary.sent, "transfer completed");
            SessionNotice::TransferCompleted(summary.clone())
        } else {
            tracing::warn!(
                transfer_id,
                sent = summary.sent,
                pending = summary.pending,
                failure = summary.failure.as_deref().unwrap_or_default(),
                "transfer failed",
            );
            SessionNotice::TransferFailed(summary.clone())
        };
        self.last_transfer = Some(summary);
        self.refresh_controls();
        let _ = self.notices.send(notice);
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            foreground: self.foreground,
            monitor: self.monitor.state(),
            pending_handshake: self.pending_handshake,
            coalesced_handshakes: self.monitor.coalesced(),
            transfers: self.monitor.dispatched(),
            sifters: self.registry.len(),
            synced: self
                .registry
                .all()
                .iter()
                .filter(|s| s.synced.is_synced())
                .count(),
            controls: self.projector.bindings().to_vec(),
            last_transfer: self.last_transfer.clone(),
        }
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
