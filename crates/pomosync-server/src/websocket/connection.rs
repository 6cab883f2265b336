//! Per-connection lifecycle: from attach through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use pomosync_core::protocol::SESSION_NOT_FOUND;
use pomosync_core::{HubError, WireMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::ClientConnection;
use crate::metrics::{FRAMES_DISCARDED_TOTAL, SESSION_QUEUE_REJECTIONS_TOTAL};
use crate::registry::SessionRegistry;
use crate::session::SessionHandle;

/// Everything a connection task needs besides its own socket and client.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Registry consulted on disconnect.
    pub registry: Arc<SessionRegistry>,
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which the peer is considered dead.
    pub heartbeat_timeout: Duration,
    /// Process-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Drive an attached client until its socket closes.
///
/// 1. Forwards queued frames to the socket and sends periodic Pings
/// 2. Feeds decoded inbound frames to the session
/// 3. On exit detaches the client and removes the session if it is empty
#[instrument(skip_all, fields(session_id = %handle.id(), client_id = %client.id))]
pub async fn run_client(
    socket: WebSocket,
    handle: SessionHandle,
    client: Arc<ClientConnection>,
    outbound: mpsc::Receiver<Arc<str>>,
    ctx: ConnectionContext,
) {
    let (ws_tx, ws_rx) = socket.split();
    info!(display_name = %client.display_name, "client connected");

    tokio::select! {
        () = write_loop(ws_tx, outbound, &client, &ctx) => {}
        () = read_loop(ws_rx, &handle, &client) => {}
    }

    if let Err(err) = handle.detach(&client.id).await {
        debug!(error = %err, "detach after disconnect failed");
    }
    let removed = ctx.registry.remove_if_empty(handle.id()).await;
    info!(
        session_removed = removed,
        dropped_frames = client.drop_count(),
        connected_secs = client.connected_at.elapsed().as_secs(),
        "client disconnected"
    );
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    client: &ClientConnection,
    ctx: &ConnectionContext,
) {
    let close = client.close_token();
    let mut ping_interval = tokio::time::interval(ctx.heartbeat_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            () = close.cancelled() => {
                debug!("client closed by session");
                break;
            }
            () = ctx.shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if !client.check_alive() && client.last_pong_elapsed() > ctx.heartbeat_timeout {
                    warn!(timeout = ?ctx.heartbeat_timeout, "client unresponsive, disconnecting");
                    break;
                }
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}

async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    handle: &SessionHandle,
    client: &ClientConnection,
) {
    while let Some(frame) = ws_rx.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(err) => {
                debug!(error = %err, "socket read failed");
                break;
            }
        };
        client.mark_alive();

        let text = match msg {
            Message::Text(ref t) => Some(t.as_str()),
            Message::Binary(ref data) => std::str::from_utf8(data).ok(),
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        let Some(text) = text else {
            debug!("discarding non-UTF8 binary frame");
            counter!(FRAMES_DISCARDED_TOTAL).increment(1);
            continue;
        };

        let message = match WireMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "discarding malformed frame");
                counter!(FRAMES_DISCARDED_TOTAL).increment(1);
                continue;
            }
        };

        match handle.submit(&client.id, message) {
            Ok(()) => {}
            Err(err @ HubError::QueueFull { .. }) => {
                warn!(error = %err, "session queue full, frame rejected");
                counter!(SESSION_QUEUE_REJECTIONS_TOTAL).increment(1);
            }
            Err(err) => {
                debug!(error = %err, kind = err.error_kind(), "session gone, ending read loop");
                break;
            }
        }
    }
}

/// Send a terminal `error` frame on a socket that never got attached, then
/// close it.
pub async fn reject(mut socket: WebSocket, err: &HubError) {
    let reason = match err {
        HubError::NotFound { .. } | HubError::SessionClosed { .. } => SESSION_NOT_FOUND.to_string(),
        other => other.to_string(),
    };
    info!(error = %err, kind = err.error_kind(), "rejecting connection");
    let frame = WireMessage::error(reason).encode();
    if socket.send(Message::Text(frame.into())).await.is_ok() {
        let _ = socket.send(Message::Close(None)).await;
    }
}
