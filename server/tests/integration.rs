//! Integration tests for the arena server.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arena_server::config::ServerConfig;
use arena_server::dispatch::GameBroadcast;
use arena_server::game_loop::{run_game_loop, GameCommand};
use arena_server::status::status_handler;
use arena_server::ws::{ws_handler, AppState};
use arena_shared::protocol::{ClientMsg, PlayerWire, ServerMsg};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> ServerConfig {
    ServerConfig {
        rng_seed: 12345,
        food_target: 0,
        max_connections_per_addr: 100,
        ..Default::default()
    }
}

/// Start a test server on a random available port and return its address.
async fn start_test_server(config: ServerConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(config.command_queue);
    let (broadcast_tx, _) = broadcast::channel::<GameBroadcast>(config.broadcast_capacity);

    let app_state = AppState {
        game_tx,
        broadcast_tx: broadcast_tx.clone(),
        connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
        trust_forwarded_for: config.trust_forwarded_for,
        max_message_bytes: config.max_message_bytes,
        max_protocol_errors: config.max_protocol_errors,
    };

    tokio::spawn(async move {
        run_game_loop(game_rx, broadcast_tx, config).await;
    });

    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/status", axum::routing::get(status_handler))
        .with_state(app_state);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Failed to connect");
    ws
}

async fn send(ws: &mut Ws, msg: &ClientMsg) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

/// Read the next text message and parse as ServerMsg.
async fn recv_msg(ws: &mut Ws) -> ServerMsg {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).expect("Failed to parse server message");
            }
            Some(Ok(_)) => continue, // Skip ping/pong
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

/// Wait for the first message matching `pred`, skipping others.
async fn recv_until<F>(ws: &mut Ws, mut pred: F) -> Option<ServerMsg>
where
    F: FnMut(&ServerMsg) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let msg = recv_msg(ws).await;
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .ok()
}

/// Join and return this client's own player from the snapshot.
async fn join(ws: &mut Ws, name: &str) -> PlayerWire {
    send(
        ws,
        &ClientMsg::Join {
            name: name.to_string(),
            color: None,
        },
    )
    .await;
    match recv_msg(ws).await {
        ServerMsg::Snapshot(snapshot) => snapshot
            .players
            .into_iter()
            .find(|p| p.id == snapshot.self_id)
            .expect("snapshot should include self"),
        other => panic!("Expected Snapshot, got {:?}", other),
    }
}

async fn wait_for_disconnect(ws: &mut Ws) -> bool {
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_millis(200), ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return true,
            Err(_) => {
                // Timeout - try sending to check if connection is dead
                if ws.send(Message::Ping(vec![].into())).await.is_err() {
                    return true;
                }
            }
            _ => continue,
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_join_receives_snapshot() {
    let addr = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;

    send(
        &mut ws,
        &ClientMsg::Join {
            name: "blob".to_string(),
            color: Some("#00ff00".to_string()),
        },
    )
    .await;

    match recv_msg(&mut ws).await {
        ServerMsg::Snapshot(snapshot) => {
            assert_eq!(snapshot.protocol_version, 1);
            assert!(snapshot.self_id > 0);
            assert_eq!(snapshot.players.len(), 1);
            assert_eq!(snapshot.players[0].color, "#00ff00");
            assert_eq!(snapshot.world.world_size, 10_000.0);
        }
        other => panic!("Expected Snapshot, got {:?}", other),
    }
}

#[tokio::test]
async fn test_snapshot_arrives_before_shared_traffic() {
    let addr = start_test_server(test_config()).await;
    let mut early = connect(addr).await;
    let mut late = connect(addr).await;

    // `late` joins while `early` is connected but has not joined yet
    let other = join(&mut late, "late").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send(&mut late, &ClientMsg::Heartbeat).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let me = join(&mut early, "early").await;
    assert_ne!(me.id, other.id);

    // Traffic after the snapshot flows normally
    send(
        &mut late,
        &ClientMsg::Move {
            x: other.x + 0.5,
            y: other.y,
            size: None,
            segments: None,
        },
    )
    .await;
    let moved = recv_until(&mut early, |m| matches!(m, ServerMsg::PlayerMoved(_))).await;
    assert!(matches!(moved, Some(ServerMsg::PlayerMoved(p)) if p.id == other.id));
}

#[tokio::test]
async fn test_move_is_relayed_to_others() {
    let addr = start_test_server(test_config()).await;
    let mut watcher = connect(addr).await;
    let mut mover = connect(addr).await;

    join(&mut watcher, "watcher").await;
    let me = join(&mut mover, "mover").await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    send(
        &mut mover,
        &ClientMsg::Move {
            x: me.x + 0.5,
            y: me.y,
            size: None,
            segments: None,
        },
    )
    .await;

    let moved = recv_until(&mut watcher, |m| matches!(m, ServerMsg::PlayerMoved(_))).await;
    match moved {
        Some(ServerMsg::PlayerMoved(p)) => {
            assert_eq!(p.id, me.id);
            assert_eq!(p.x, me.x + 0.5);
        }
        other => panic!("Expected PlayerMoved, got {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_bounds_move_is_corrected() {
    let addr = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;
    let me = join(&mut ws, "cheater").await;

    send(
        &mut ws,
        &ClientMsg::Move {
            x: 10_000.0,
            y: 10_000.0,
            size: Some(500.0),
            segments: None,
        },
    )
    .await;

    match recv_until(&mut ws, |m| matches!(m, ServerMsg::ForcePosition(_))).await {
        Some(ServerMsg::ForcePosition(pos)) => {
            assert_eq!((pos.x, pos.y), (me.x, me.y));
        }
        other => panic!("Expected ForcePosition, got {:?}", other),
    }
}

#[tokio::test]
async fn test_heartbeat_returns_player_count() {
    let addr = start_test_server(test_config()).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    join(&mut a, "a").await;
    join(&mut b, "b").await;

    send(&mut b, &ClientMsg::Heartbeat).await;
    match recv_until(&mut b, |m| matches!(m, ServerMsg::PlayerCount(_))).await {
        Some(ServerMsg::PlayerCount(count)) => assert_eq!(count.count, 2),
        other => panic!("Expected PlayerCount, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_broadcasts_player_left() {
    let addr = start_test_server(test_config()).await;
    let mut stayer = connect(addr).await;
    let mut leaver = connect(addr).await;
    join(&mut stayer, "stayer").await;
    let gone = join(&mut leaver, "leaver").await;

    leaver.close(None).await.unwrap();

    let left = recv_until(&mut stayer, |m| matches!(m, ServerMsg::PlayerLeft(_))).await;
    match left {
        Some(ServerMsg::PlayerLeft(msg)) => assert_eq!(msg.id, gone.id),
        other => panic!("Expected PlayerLeft, got {:?}", other),
    }

    // Base size 10 leaves 10 scattered food items
    let delta = recv_until(&mut stayer, |m| matches!(m, ServerMsg::FoodDelta(_))).await;
    match delta {
        Some(ServerMsg::FoodDelta(d)) => assert_eq!(d.added.len(), 10),
        other => panic!("Expected FoodDelta, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_quota_closes_excess_sockets() {
    let config = ServerConfig {
        max_connections_per_addr: 2,
        ..test_config()
    };
    let addr = start_test_server(config).await;

    let mut first = connect(addr).await;
    let _second = connect(addr).await;
    let mut third = connect(addr).await;

    assert!(
        wait_for_disconnect(&mut third).await,
        "Third connection within the window should be closed"
    );
    join(&mut first, "admitted").await;
}

#[tokio::test]
async fn test_parse_spam_disconnects_client() {
    let config = ServerConfig {
        max_protocol_errors: 5,
        ..test_config()
    };
    let addr = start_test_server(config).await;
    let mut ws = connect(addr).await;
    join(&mut ws, "spammer").await;

    for _ in 0..10 {
        if ws
            .send(Message::Text("not valid json".into()))
            .await
            .is_err()
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(
        wait_for_disconnect(&mut ws).await,
        "Client should be disconnected after too many malformed messages"
    );
}

#[tokio::test]
async fn test_status_endpoint_reports_counts() {
    let config = ServerConfig {
        food_target: 25,
        ..test_config()
    };
    let addr = start_test_server(config).await;
    let mut ws = connect(addr).await;
    join(&mut ws, "counted").await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "got {}", response);
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["playerCount"], 1);
    assert_eq!(json["foodCount"], 25);
    assert!(json["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn test_idle_session_is_closed_by_server() {
    let config = ServerConfig {
        reaper_interval: Duration::from_millis(50),
        max_inactive: Duration::from_millis(150),
        ..test_config()
    };
    let addr = start_test_server(config).await;
    let mut idle = connect(addr).await;
    let me = join(&mut idle, "idle").await;

    let mut closed = false;
    let mut saw_own_departure = false;
    for _ in 0..20 {
        match tokio::time::timeout(Duration::from_millis(100), idle.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {
                closed = true;
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(ServerMsg::PlayerLeft(left)) = serde_json::from_str(&text) {
                    saw_own_departure |= left.id == me.id;
                }
            }
            _ => continue,
        }
    }
    assert!(closed, "Server should close the socket of an idle session");
    assert!(saw_own_departure, "Timed-out player is announced as left");
}
