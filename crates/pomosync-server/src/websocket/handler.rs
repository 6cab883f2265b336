//! `create` and `join` upgrade handlers.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{OnFailedUpgrade, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use pomosync_core::{HubError, SessionId};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::ConnectionPermit;
use super::connection::{self, ConnectionContext};
use crate::client::ClientConnection;
use crate::identity::resolve_display_name;
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::server::AppState;

/// Query of `GET /ws/create`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    /// Boolean as text; anything unparsable means private.
    #[serde(default)]
    pub public: Option<String>,
    /// Opaque identity token.
    #[serde(default)]
    pub user_id: String,
}

/// Query of `GET /ws/join`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    /// Session to join.
    #[serde(default)]
    pub session: String,
    /// Opaque identity token.
    #[serde(default)]
    pub user_id: String,
}

/// Parse the `public` flag. True spellings are `1 t T TRUE true True`.
///
/// Missing or unrecognized values mean private.
pub fn parse_public(raw: Option<&str>) -> bool {
    matches!(raw, Some("1" | "t" | "T" | "TRUE" | "true" | "True"))
}

/// `GET /ws/create?public=<bool>&userId=<token>`
pub async fn create_handler(
    State(state): State<AppState>,
    Query(params): Query<CreateParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let (ws, permit) = match admit(&state, ws) {
        Ok(admitted) => admitted,
        Err(resp) => return resp,
    };
    let public = parse_public(params.public.as_deref());
    let shutdown = Arc::clone(&state.shutdown);
    configure(ws, &state).on_upgrade(move |socket| {
        shutdown.track(create_session(socket, state, public, params.user_id, permit))
    })
}

/// `GET /ws/join?session=<id>&userId=<token>`
pub async fn join_handler(
    State(state): State<AppState>,
    Query(params): Query<JoinParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let (ws, permit) = match admit(&state, ws) {
        Ok(admitted) => admitted,
        Err(resp) => return resp,
    };
    let session_id = SessionId::from_raw(params.session);
    let shutdown = Arc::clone(&state.shutdown);
    configure(ws, &state).on_upgrade(move |socket| {
        shutdown.track(join_session(socket, state, session_id, params.user_id, permit))
    })
}

/// Accept the upgrade request and reserve a connection slot.
#[allow(clippy::result_large_err)]
fn admit(
    state: &AppState,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<(WebSocketUpgrade, ConnectionPermit), Response> {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            let err = HubError::ConnectionUpgrade(rejection.body_text());
            warn!(error = %err, kind = err.error_kind(), "websocket upgrade rejected");
            return Err(rejection.into_response());
        }
    };
    let Some(permit) = state.limiter.try_acquire() else {
        warn!(max = state.config.max_connections, "connection limit reached");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return Err((StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response());
    };
    Ok((ws, permit))
}

fn configure(ws: WebSocketUpgrade, state: &AppState) -> WebSocketUpgrade<impl OnFailedUpgrade> {
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|err: axum::Error| {
            let err = HubError::ConnectionUpgrade(err.to_string());
            warn!(error = %err, kind = err.error_kind(), "websocket upgrade failed");
        })
}

fn context(state: &AppState) -> ConnectionContext {
    ConnectionContext {
        registry: Arc::clone(&state.registry),
        heartbeat_interval: state.config.heartbeat_interval(),
        heartbeat_timeout: state.config.heartbeat_timeout(),
        shutdown: state.shutdown.token(),
    }
}

#[instrument(skip_all, fields(public = public))]
async fn create_session(
    socket: WebSocket,
    state: AppState,
    public: bool,
    user_id: String,
    _permit: ConnectionPermit,
) {
    let name = resolve_display_name(state.identity.as_ref(), &user_id, state.identity_timeout).await;
    let (client, outbound) = ClientConnection::new(name, state.config.client_queue_capacity);

    match state.registry.create(public, Arc::clone(&client)).await {
        Ok(handle) => connection::run_client(socket, handle, client, outbound, context(&state)).await,
        Err(err) => connection::reject(socket, &err).await,
    }
}

#[instrument(skip_all, fields(session_id = %session_id))]
async fn join_session(
    socket: WebSocket,
    state: AppState,
    session_id: SessionId,
    user_id: String,
    _permit: ConnectionPermit,
) {
    // Fail fast before the identity round trip.
    if let Err(err) = state.registry.get(&session_id).await {
        connection::reject(socket, &err).await;
        return;
    }

    let name = resolve_display_name(state.identity.as_ref(), &user_id, state.identity_timeout).await;
    let (client, outbound) = ClientConnection::new(name, state.config.client_queue_capacity);

    match state.registry.attach(&session_id, Arc::clone(&client)).await {
        Ok(handle) => {
            info!(client_id = %client.id, "joined session");
            connection::run_client(socket, handle, client, outbound, context(&state)).await;
        }
        Err(err) => connection::reject(socket, &err).await,
    }
}
