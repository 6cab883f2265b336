//! End-to-end tests against a real listener using WebSocket and HTTP clients.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pomosync_core::{Action, SessionId, WireMessage};
use pomosync_server::identity::StaticDirectory;
use pomosync_server::{HubServer, ServerConfig};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a hub on an ephemeral port with two known users.
async fn boot_server_with(config: ServerConfig) -> (SocketAddr, HubServer) {
    let users = HashMap::from([
        ("u-ana".to_string(), "ana".to_string()),
        ("u-bo".to_string(), "bo".to_string()),
    ]);
    let server = HubServer::new(
        config,
        Arc::new(StaticDirectory::new(users)),
        pomosync_server::metrics::detached_handle(),
    );
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn boot_server() -> (SocketAddr, HubServer) {
    boot_server_with(ServerConfig::default()).await
}

async fn connect(addr: SocketAddr, path_and_query: &str) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}{path_and_query}")).await.unwrap();
    ws
}

/// Next protocol frame, skipping control frames.
async fn next_message(ws: &mut WsStream) -> WireMessage {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return WireMessage::decode(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrive within `wait`.
async fn expect_silence(ws: &mut WsStream, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

async fn send(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn get_json(addr: SocketAddr, path: &str) -> (u16, Value) {
    let resp = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

/// Create a session as `user` and return (socket, session id).
async fn create_session(addr: SocketAddr, public: bool, user: &str) -> (WsStream, String) {
    let mut ws = connect(addr, &format!("/ws/create?public={public}&userId={user}")).await;
    let created = next_message(&mut ws).await;
    assert_eq!(created.action, Action::Created);
    let joined = next_message(&mut ws).await;
    assert_eq!(joined.action, Action::UserJoined);
    (ws, created.data)
}

async fn wait_until_removed(addr: SocketAddr, server: &HubServer, id: &str) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let gone = server.registry().is_empty().await;
        let (_, list) = get_json(addr, "/getSessions").await;
        let listed = list
            .as_array()
            .is_some_and(|l| l.iter().any(|s| s["id"] == id));
        if gone && !listed {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "session {id} was not removed");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn shared_timer_scenario() {
    let (addr, server) = boot_server().await;

    // Create a public session; it shows up in the listing.
    let mut ana = connect(addr, "/ws/create?public=true&userId=u-ana").await;
    let created = next_message(&mut ana).await;
    assert_eq!(created.action, Action::Created);
    let id = created.data.clone();
    assert_eq!(id.len(), 8);
    let joined = next_message(&mut ana).await;
    assert_eq!(joined.action, Action::UserJoined);
    assert_eq!(joined.data, "ana");

    let (status, list) = get_json(addr, "/getSessions").await;
    assert_eq!(status, 200);
    assert_eq!(
        list,
        json!([{"id": id, "public": true, "startTime": 0, "elapsedTime": 0}])
    );

    // Second participant joins; both see userJoined.
    let mut bo = connect(addr, &format!("/ws/join?session={id}&userId=u-bo")).await;
    let bo_joined = next_message(&mut bo).await;
    assert_eq!(bo_joined.action, Action::UserJoined);
    assert_eq!(bo_joined.data, "bo");
    let ana_saw = next_message(&mut ana).await;
    assert_eq!(ana_saw.action, Action::UserJoined);
    assert_eq!(ana_saw.data, "bo");

    // Play reaches both with a fresh start.
    send(&mut ana, json!({"action": "play", "data": ""})).await;
    for ws in [&mut ana, &mut bo] {
        let msg = next_message(ws).await;
        assert_eq!(msg.action, Action::Play);
        assert_eq!(msg.elapsed_time, 0);
        assert!(msg.start_time > 0);
        assert_eq!(msg.username, "ana");
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    // Pause from the other participant closes the interval.
    send(&mut bo, json!({"action": "pause", "data": ""})).await;
    for ws in [&mut ana, &mut bo] {
        let msg = next_message(ws).await;
        assert_eq!(msg.action, Action::Pause);
        assert!(msg.elapsed_time >= 1, "elapsed {}", msg.elapsed_time);
        assert_eq!(msg.start_time, 0);
        assert_eq!(msg.username, "bo");
    }

    // Leaving is announced to whoever remains.
    ana.close(None).await.unwrap();
    let left = next_message(&mut bo).await;
    assert_eq!(left.action, Action::UserLeft);
    assert_eq!(left.data, "ana");

    bo.close(None).await.unwrap();
    wait_until_removed(addr, &server, &id).await;
}

#[tokio::test]
async fn join_unknown_session_gets_error_then_close() {
    let (addr, server) = boot_server().await;
    let mut ws = connect(addr, "/ws/join?session=NOPEnope&userId=u-bo").await;

    let msg = next_message(&mut ws).await;
    assert_eq!(msg.action, Action::Error);
    assert_eq!(msg.data, "Session not found");

    let next = timeout(TIMEOUT, ws.next()).await.unwrap();
    assert!(
        matches!(next, None | Some(Ok(Message::Close(_)) | Err(_))),
        "expected close, got {next:?}"
    );
    assert!(server.registry().is_empty().await);
}

#[tokio::test]
async fn malformed_frame_is_discarded_and_connection_survives() {
    let (addr, _server) = boot_server().await;
    let (mut ws, id) = create_session(addr, false, "u-ana").await;

    ws.send(Message::Text("not json at all".to_string().into())).await.unwrap();
    ws.send(Message::Text(r#"{"action":"play","startTime":"soon"}"#.to_string().into()))
        .await
        .unwrap();
    send(&mut ws, json!({"action": "chat", "data": "still here"})).await;

    let msg = next_message(&mut ws).await;
    assert_eq!(msg.action, Action::Chat);
    assert_eq!(msg.data, "still here");
    assert_eq!(msg.start_time, 0);
    assert_eq!(msg.elapsed_time, 0);

    let (status, users) = get_json(addr, &format!("/sessions/{id}/users")).await;
    assert_eq!(status, 200);
    assert_eq!(users, json!(["ana"]));
}

#[tokio::test]
async fn binary_frames_are_accepted() {
    let (addr, _server) = boot_server().await;
    let (mut ws, _id) = create_session(addr, false, "u-ana").await;

    let payload = json!({"action": "chat", "data": "from binary"}).to_string();
    ws.send(Message::Binary(payload.into_bytes().into())).await.unwrap();

    let msg = next_message(&mut ws).await;
    assert_eq!(msg.action, Action::Chat);
    assert_eq!(msg.data, "from binary");
}

#[tokio::test]
async fn unknown_actions_are_ignored() {
    let (addr, _server) = boot_server().await;
    let (mut ws, _id) = create_session(addr, false, "u-ana").await;

    send(&mut ws, json!({"action": "skipBreak", "data": "x"})).await;
    send(&mut ws, json!({"action": "created", "data": "spoof"})).await;
    expect_silence(&mut ws, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn joiner_of_fresh_session_gets_no_replay() {
    let (addr, _server) = boot_server().await;
    let (_ana, id) = create_session(addr, false, "u-ana").await;

    let mut bo = connect(addr, &format!("/ws/join?session={id}&userId=u-bo")).await;
    let first = next_message(&mut bo).await;
    assert_eq!(first.action, Action::UserJoined);
    expect_silence(&mut bo, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn late_joiner_gets_one_replay() {
    let (addr, server) = boot_server().await;
    let (mut ana, id) = create_session(addr, false, "u-ana").await;

    send(&mut ana, json!({"action": "play", "data": ""})).await;
    let play = next_message(&mut ana).await;
    assert_eq!(play.action, Action::Play);

    let mut bo = connect(addr, &format!("/ws/join?session={id}&userId=u-bo")).await;
    let replay = next_message(&mut bo).await;
    assert_eq!(replay.action, Action::Play);
    assert_eq!(replay.data, format!("{},0", play.start_time));
    assert_eq!(replay.start_time, play.start_time);

    let joined = next_message(&mut bo).await;
    assert_eq!(joined.action, Action::UserJoined);
    expect_silence(&mut bo, Duration::from_millis(200)).await;

    // The replay did not restart the timer.
    let handle = server.registry().get(&SessionId::from_raw(id.clone())).await.unwrap();
    assert_eq!(handle.timer().start_epoch_ms, play.start_time);
    let (_, users) = get_json(addr, &format!("/sessions/{id}/users")).await;
    assert_eq!(users, json!(["ana", "bo"]));
}

#[tokio::test]
async fn private_sessions_are_not_listed() {
    let (addr, _server) = boot_server().await;
    let (_ws, _id) = create_session(addr, false, "u-ana").await;
    let (_, list) = get_json(addr, "/getSessions").await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn unknown_identity_joins_with_empty_name() {
    let (addr, _server) = boot_server().await;
    let mut ws = connect(addr, "/ws/create?public=1&userId=stranger").await;
    let _created = next_message(&mut ws).await;
    let joined = next_message(&mut ws).await;
    assert_eq!(joined.action, Action::UserJoined);
    assert_eq!(joined.data, "");
}

#[tokio::test]
async fn health_and_users_endpoints() {
    let (addr, _server) = boot_server().await;
    let (_ana, id) = create_session(addr, true, "u-ana").await;
    let mut bo = connect(addr, &format!("/ws/join?session={id}&userId=u-bo")).await;
    let _ = next_message(&mut bo).await;

    let (status, users) = get_json(addr, &format!("/sessions/{id}/users")).await;
    assert_eq!(status, 200);
    assert_eq!(users, json!(["ana", "bo"]));

    let (status, _) = get_json(addr, "/sessions/NOPEnope/users").await;
    assert_eq!(status, 404);

    let (status, health) = get_json(addr, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 2);
    assert_eq!(health["activeSessions"], 1);
}

#[tokio::test]
async fn connection_limit_refuses_upgrade() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (addr, _server) = boot_server_with(config).await;
    let (_first, _id) = create_session(addr, false, "u-ana").await;

    let refused = connect_async(format!("ws://{addr}/ws/create?userId=u-bo")).await;
    match refused {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status().as_u16(), 503);
        }
        other => panic!("expected HTTP 503, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_closes_connections_and_sessions() {
    let (addr, server) = boot_server().await;
    let (mut ws, _id) = create_session(addr, true, "u-ana").await;

    server.shutdown().shutdown();

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection stayed open after shutdown");
}

fn fast_heartbeat() -> ServerConfig {
    ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn silent_peer_is_disconnected_by_heartbeat() {
    let (addr, server) = boot_server_with(fast_heartbeat()).await;
    let (mut ws, id) = create_session(addr, true, "u-ana").await;

    // Not polling the socket means the Pings are never answered.
    wait_until_removed(addr, &server, &id).await;

    let mut pinged = false;
    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) => pinged = true,
                None | Some(Err(_) | Ok(Message::Close(_))) => return,
                Some(Ok(other)) => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "unresponsive peer was never closed");
    assert!(pinged, "server never sent a Ping");
}

#[tokio::test]
async fn responsive_peer_survives_heartbeat() {
    let (addr, server) = boot_server_with(fast_heartbeat()).await;
    let (mut ws, id) = create_session(addr, true, "u-ana").await;

    // Reading lets the client answer each Ping with a Pong.
    expect_silence(&mut ws, Duration::from_secs(3)).await;

    assert!(server.registry().get(&SessionId::from_raw(id.clone())).await.is_ok());
    send(&mut ws, json!({"action": "chat", "data": "still here"})).await;
    let echoed = next_message(&mut ws).await;
    assert_eq!(echoed.action, Action::Chat);
    assert_eq!(echoed.data, "still here");
}
