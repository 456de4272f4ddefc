use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use sifter_core::config::{load_seed_at, sifter_root};
use sifter_core::{SessionConfig, SifterId};
use sifter_sync::{EncodeOptions, Notification, OutboxTransport, SyncTransfer};
use sifter_ui::ControlHandle;

use crate::error::{io_err, DaemonError};
use crate::paths::{outbox_path, socket_path, DAEMON_LABEL};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::session::{self, SessionHandle, SessionNotice};

/// Load config, install logging, and block the current thread on [`run`].
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let config = SessionConfig::load_at(home)?;
    init_tracing(&config.log_filter);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run one host session behind the daemon socket until `stop` or ctrl-c.
pub async fn run(home: PathBuf, config: SessionConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let seed = load_seed_at(&home)?;
    let outbox = outbox_path(&home);
    let transport = OutboxTransport::open(&outbox)?;
    let transfer = SyncTransfer::new(
        Arc::new(transport),
        EncodeOptions {
            title_max_chars: config.title_max_chars,
        },
    );
    let (handle, session_task) = session::spawn(&config, transfer, seed)?;
    let started_at_unix = unix_seconds_now();

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let notice_handle = {
        let notices = handle.subscribe();
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move { notice_log_task(notices, shutdown.subscribe()).await })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                handle,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (notice_result, socket_result, signal_result) =
        tokio::join!(notice_handle, socket_handle, signal_handle);

    // Session teardown waits for an in-flight transfer.
    if handle.shutdown().await.is_ok() {
        session_task
            .await
            .map_err(|err| DaemonError::Protocol(format!("session task join failure: {err}")))?;
    }

    handle_join("notice_log", notice_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn notice_log_task(
    mut notices: broadcast::Receiver<SessionNotice>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            notice = notices.recv() => match notice {
                Ok(notice) => log_notice(&notice),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "session notice log lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn log_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::TransferCompleted(summary) => tracing::info!(
            transfer_id = summary.transfer_id,
            sent = summary.sent,
            duration_ms = summary.duration_ms,
            "device sync completed",
        ),
        SessionNotice::TransferFailed(summary) => tracing::warn!(
            transfer_id = summary.transfer_id,
            sent = summary.sent,
            pending = summary.pending,
            "device sync failed",
        ),
        other => tracing::debug!(notice = ?other, "session notice"),
    }
}

async fn socket_server_task(
    home: PathBuf,
    handle: SessionHandle,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let root = sifter_root(&home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let handle = handle.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        handle,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    handle: SessionHandle,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = if stop {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        } else {
            dispatch_request(&home, &handle, request, started_at_unix).await
        };

        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

/// Map one socket request onto the session handle.
async fn dispatch_request(
    home: &Path,
    handle: &SessionHandle,
    request: DaemonRequest,
    started_at_unix: u64,
) -> DaemonResponse {
    let result = match request.cmd.as_str() {
        "status" => build_status_payload(home, handle, started_at_unix).await,
        "list" => handle
            .list()
            .await
            .map(|sifters| json!({ "sifters": sifters })),
        "add" => match request.name {
            Some(name) if !name.trim().is_empty() => handle
                .add_sifter(name, request.rule.unwrap_or_default())
                .await
                .map(|id| json!({ "id": id })),
            _ => Err(DaemonError::Protocol("add requires a non-empty name".to_string())),
        },
        "remove" => match request.id {
            Some(id) => handle
                .remove_sifter(SifterId(id))
                .await
                .map(|removed| json!({ "removed": removed })),
            None => Err(DaemonError::Protocol("remove requires an id".to_string())),
        },
        "activate" => match request.id {
            Some(id) => handle
                .activate_control(ControlHandle(id))
                .await
                .map(|sifter_id| json!({ "sifter_id": sifter_id })),
            None => Err(DaemonError::Protocol("activate requires a control id".to_string())),
        },
        "foreground" => handle.foreground().await.map(|()| json!({ "foreground": true })),
        "background" => handle.background().await.map(|()| json!({ "foreground": false })),
        "handshake" => notify(handle, Notification::Handshake).await,
        "notify" => match (request.dict, request.token) {
            (Some(dict), _) => notify(handle, Notification::classify(&dict)).await,
            (None, Some(token)) => notify(handle, Notification::Select { token }).await,
            (None, None) => Err(DaemonError::Protocol(
                "notify requires a dict or a token".to_string(),
            )),
        },
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn notify(handle: &SessionHandle, notification: Notification) -> Result<Value, DaemonError> {
    let payload = json!({ "notification": notification });
    handle.notify(notification).await?;
    Ok(payload)
}

async fn build_status_payload(
    home: &Path,
    handle: &SessionHandle,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let session = handle.status().await?;
    let last_sync_at_unix = session
        .last_transfer
        .as_ref()
        .filter(|summary| summary.is_success())
        .map(|summary| summary.finished_at_unix)
        .unwrap_or(0);

    Ok(json!({
        "running": true,
        "label": DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "last_sync_at_unix": last_sync_at_unix,
        "session": session,
        "socket": socket_path(home).display().to_string(),
        "outbox": outbox_path(home).display().to_string(),
    }))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = sifter_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use sifter_core::SeedSifter;
    use sifter_sync::{Dictionary, OutboundMessage, TupleValue};
    use tempfile::TempDir;

    use crate::protocol::send_request;

    fn start_session(home: &Path, names: &[&str]) -> SessionHandle {
        let transport = OutboxTransport::open(&outbox_path(home)).expect("outbox");
        let transfer = SyncTransfer::new(Arc::new(transport), EncodeOptions::default());
        let seed = names
            .iter()
            .map(|n| SeedSifter {
                name: n.to_string(),
                rule: String::new(),
            })
            .collect();
        let (handle, _task) =
            session::spawn(&SessionConfig::default(), transfer, seed).expect("session");
        handle
    }

    async fn call(home: &Path, handle: &SessionHandle, request: DaemonRequest) -> DaemonResponse {
        dispatch_request(home, handle, request, 1_000).await
    }

    #[tokio::test]
    async fn status_payload_reports_session_state() {
        let home = TempDir::new().expect("home");
        let handle = start_session(home.path(), &["a", "b"]);

        let response = call(home.path(), &handle, DaemonRequest::new("status")).await;
        assert!(response.ok);
        let data = response.data.expect("data");
        assert_eq!(data["running"], json!(true));
        assert_eq!(data["started_at_unix"], json!(1_000u64));
        assert_eq!(data["last_sync_at_unix"], json!(0u64));
        assert_eq!(data["session"]["sifters"], json!(2));
        assert_eq!(data["session"]["monitor"], json!("idle"));
    }

    #[tokio::test]
    async fn add_then_list_keeps_order() {
        let home = TempDir::new().expect("home");
        let handle = start_session(home.path(), &["seeded"]);

        let added = call(
            home.path(),
            &handle,
            DaemonRequest {
                name: Some("errors".into()),
                rule: Some("level=error".into()),
                ..DaemonRequest::new("add")
            },
        )
        .await;
        assert_eq!(added.data.expect("data")["id"], json!(2));

        let listed = call(home.path(), &handle, DaemonRequest::new("list")).await;
        let sifters = listed.data.expect("data")["sifters"].clone();
        let names: Vec<&str> = sifters
            .as_array()
            .expect("array")
            .iter()
            .map(|s| s["name"].as_str().expect("name"))
            .collect();
        assert_eq!(names, ["seeded", "errors"]);
    }

    #[tokio::test]
    async fn status_lists_control_handles_that_activate() {
        let home = TempDir::new().expect("home");
        let handle = start_session(home.path(), &["a", "b"]);
        call(home.path(), &handle, DaemonRequest::new("foreground")).await;

        let status = call(home.path(), &handle, DaemonRequest::new("status")).await;
        let controls = status.data.expect("data")["session"]["controls"].clone();
        let second = &controls.as_array().expect("controls")[1];
        assert_eq!(second["sifter_id"], json!(2));
        assert_eq!(second["label"], json!("b"));

        let activated = call(
            home.path(),
            &handle,
            DaemonRequest {
                id: second["handle"].as_u64(),
                ..DaemonRequest::new("activate")
            },
        )
        .await;
        assert_eq!(activated.data.expect("data")["sifter_id"], json!(2));
    }

    #[tokio::test]
    async fn remove_unknown_id_is_an_error_response() {
        let home = TempDir::new().expect("home");
        let handle = start_session(home.path(), &[]);
        let response = call(
            home.path(),
            &handle,
            DaemonRequest {
                id: Some(42),
                ..DaemonRequest::new("remove")
            },
        )
        .await;
        assert!(!response.ok);
        assert!(response.error.expect("error").contains("42"));
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let home = TempDir::new().expect("home");
        let handle = start_session(home.path(), &[]);
        let response = call(home.path(), &handle, DaemonRequest::new("reboot")).await;
        assert_eq!(response.error.as_deref(), Some("daemon protocol error: unknown command 'reboot'"));
    }

    #[tokio::test]
    async fn handshake_dictionary_writes_outbox_in_registry_order() {
        let home = TempDir::new().expect("home");
        let handle = start_session(home.path(), &["a", "b"]);
        let mut notices = handle.subscribe();

        call(home.path(), &handle, DaemonRequest::new("foreground")).await;
        let mut dict = Dictionary::new();
        dict.insert(3, TupleValue::Int(1));
        let response = call(
            home.path(),
            &handle,
            DaemonRequest {
                dict: Some(dict),
                ..DaemonRequest::new("notify")
            },
        )
        .await;
        assert_eq!(
            response.data.expect("data")["notification"]["kind"],
            json!("handshake")
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(SessionNotice::TransferCompleted(_)) = notices.recv().await {
                    break;
                }
            }
        })
        .await
        .expect("transfer completes");

        let contents = fs::read_to_string(outbox_path(home.path())).expect("outbox");
        let ids: Vec<SifterId> = contents
            .lines()
            .map(|l| serde_json::from_str::<OutboundMessage>(l).expect("line").sifter_id)
            .collect();
        assert_eq!(ids, vec![SifterId(1), SifterId(2)]);
    }

    #[tokio::test]
    async fn socket_server_answers_status_and_stops() {
        let home = TempDir::new().expect("home");
        let handle = start_session(home.path(), &["a"]);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        let server = {
            let home = home.path().to_path_buf();
            let shutdown = shutdown_tx.clone();
            tokio::spawn(async move {
                socket_server_task(home, handle, shutdown.clone(), shutdown.subscribe(), 7).await
            })
        };

        let socket = socket_path(home.path());
        tokio::time::timeout(Duration::from_secs(5), async {
            while !socket.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("socket bound");

        let client_home = home.path().to_path_buf();
        let (status, stop) = tokio::task::spawn_blocking(move || {
            let status = send_request(&client_home, &DaemonRequest::new("status"));
            let stop = send_request(&client_home, &DaemonRequest::new("stop"));
            (status, stop)
        })
        .await
        .expect("client thread");

        let status = status.expect("status response");
        assert!(status.ok);
        assert_eq!(status.data.expect("data")["started_at_unix"], json!(7u64));
        assert!(stop.expect("stop response").ok);

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server exits")
            .expect("server task")
            .expect("server result");
        assert!(!socket.exists());
    }

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let home = TempDir::new().expect("home");
        let socket = home.path().join("daemon.sock");
        fs::write(&socket, b"").expect("stale file");
        prepare_socket_for_bind(&socket).expect("prepare");
        assert!(!socket.exists());
    }
}
