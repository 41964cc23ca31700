use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};

use matchcast_core::{config, Config, ConnectionId, DocumentStore, TenantKey};
use matchcast_sync::SyncEngine;

use crate::error::{io_err, DaemonError};
use crate::paths::{matchcast_root, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::transport::ChannelSubscriber;

/// Shared by every connection handler.
struct ServerContext {
    home: PathBuf,
    config: Config,
    engine: Arc<SyncEngine>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// What the connection loop does after a request.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let config = config::load_at(&home)?;

    let engine = Arc::new(SyncEngine::from_config(
        Arc::new(DocumentStore::new()),
        &config,
    ));
    let started_at_unix = unix_seconds_now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tracing::info!(
        socket = %socket_path(&home).display(),
        flush_interval_ms = config.flush_interval().as_millis() as u64,
        score_path = %config.score_path,
        "starting matchcast daemon",
    );

    let flush_handle = {
        let shutdown = shutdown_tx.clone();
        let engine = engine.clone();
        let period = config.flush_interval();
        tokio::spawn(async move {
            let result = flush_task(engine, period, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = Arc::new(ServerContext {
            home: home.clone(),
            config: config.clone(),
            engine: engine.clone(),
            shutdown_tx: shutdown.clone(),
            started_at_unix,
        });
        tokio::spawn(async move {
            let result = socket_server_task(ctx, shutdown.subscribe()).await;
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

    let (flush_result, socket_result, signal_result) =
        tokio::join!(flush_handle, socket_handle, signal_handle);

    handle_join("flush_ticker", flush_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("matchcast daemon stopped");
    Ok(())
}

/// Drive [`SyncEngine::flush`] every `period` until shutdown, then flush once
/// more so nothing accepted is left behind.
async fn flush_task(
    engine: Arc<SyncEngine>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                engine.flush();
                break;
            }
            _ = interval.tick() => {
                engine.flush();
            }
        }
    }
    Ok(())
}

async fn socket_server_task(
    ctx: Arc<ServerContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&ctx.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    let next_id = AtomicU64::new(1);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let conn = ConnectionId(next_id.fetch_add(1, Ordering::Relaxed));
                let ctx = ctx.clone();
                let shutdown_rx = ctx.shutdown_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, conn, ctx, shutdown_rx).await {
                        tracing::error!(%conn, error = %err, "socket client error");
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
    conn: ConnectionId,
    ctx: Arc<ServerContext>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer_handle = tokio::spawn(writer_task(writer, rx));
    tracing::debug!(%conn, "connection accepted");

    let served = serve_requests(BufReader::new(reader), conn, &ctx, &tx, shutdown_rx).await;

    // The router holds a sender clone until the connection leaves its group;
    // the writer only finishes once every sender is gone.
    ctx.engine.disconnect(conn);
    drop(tx);
    let written = handle_join("socket_writer", writer_handle.await);
    tracing::debug!(%conn, "connection closed");
    served.and(written)
}

/// Read request lines until EOF, shutdown, an oversize line or `stop`.
async fn serve_requests(
    mut reader: BufReader<OwnedReadHalf>,
    conn: ConnectionId,
    ctx: &ServerContext,
    tx: &mpsc::UnboundedSender<String>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let limit = ctx.config.max_line_bytes;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let mut bounded = (&mut reader).take(limit as u64 + 1);
        let read = tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            read = bounded.read_until(b'\n', &mut buf) => {
                read.map_err(|e| io_err("daemon socket read", e))?
            }
        };
        if read == 0 {
            return Ok(());
        }
        if buf.len() > limit && buf.last() != Some(&b'\n') {
            tracing::warn!(%conn, limit, "request line too long, closing connection");
            return send_line(
                tx,
                &DaemonResponse::error(format!("request line exceeds {limit} bytes")),
            );
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(line) {
            Ok(request) => request,
            Err(err) => {
                send_line(
                    tx,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )?;
                continue;
            }
        };

        if handle_request(ctx, conn, tx, request)? == Flow::Close {
            return Ok(());
        }
    }
}

/// Answer one request. Every branch queues exactly one response line; `join`
/// queues its acknowledgement ahead of the `init` event.
fn handle_request(
    ctx: &ServerContext,
    conn: ConnectionId,
    tx: &mpsc::UnboundedSender<String>,
    request: DaemonRequest,
) -> Result<Flow, DaemonError> {
    let tenant = request.tenant.as_deref();
    let engine = &ctx.engine;

    let response = match request.cmd.as_str() {
        "join" => {
            let key = TenantKey::normalize(tenant);
            send_line(tx, &DaemonResponse::ok(json!({ "tenant": key })))?;
            let subscriber = Arc::new(ChannelSubscriber::new(conn, tx.clone()));
            engine.join(conn, tenant, subscriber);
            return Ok(Flow::Continue);
        }
        "publish_update" => {
            let outcome = engine.publish_update(tenant, request.match_data, request.overlays);
            DaemonResponse::ok(serde_json::to_value(outcome)?)
        }
        "publish_sequence" => {
            let outcome = engine.publish_sequence(tenant, request.wagon_data);
            DaemonResponse::ok(serde_json::to_value(outcome)?)
        }
        "snapshot" => DaemonResponse::ok(serde_json::to_value(engine.snapshot(tenant))?),
        "status" => DaemonResponse::ok(build_status_payload(ctx)?),
        "stop" => {
            tracing::info!(%conn, "stop requested");
            let _ = ctx.shutdown_tx.send(());
            send_line(tx, &DaemonResponse::ok(json!({ "stopping": true })))?;
            return Ok(Flow::Close);
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    };

    send_line(tx, &response)?;
    Ok(Flow::Continue)
}

fn build_status_payload(ctx: &ServerContext) -> Result<Value, DaemonError> {
    let engine = &ctx.engine;
    let tenants = engine.status();

    Ok(json!({
        "running": true,
        "started_at_unix": ctx.started_at_unix,
        "socket": socket_path(&ctx.home).display().to_string(),
        "flush_interval_ms": ctx.config.flush_interval().as_millis() as u64,
        "score_path": ctx.config.score_path,
        "tenant_count": tenants.len(),
        "connection_count": engine.router().connection_count(),
        "pending": engine.coalescer().pending_total(),
        "tenants": serde_json::to_value(tenants)?,
    }))
}

async fn writer_task(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
) -> Result<(), DaemonError> {
    while let Some(line) = rx.recv().await {
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| io_err("daemon socket write", e))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| io_err("daemon socket write", e))?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}

fn send_line(
    tx: &mpsc::UnboundedSender<String>,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    tx.send(payload)
        .map_err(|_| DaemonError::Protocol("connection writer closed".to_string()))
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
    let root = matchcast_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
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

/// `RUST_LOG` picks the filter (default `info`); `MATCHCAST_LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("MATCHCAST_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
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
