use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use arena_shared::protocol::{ClientMsg, ServerMsg, SessionId};

use crate::dispatch::{Audience, GameBroadcast};
use crate::error::ArenaError;
use crate::game_loop::GameCommand;
use crate::gateway::client_addr;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub broadcast_tx: broadcast::Sender<GameBroadcast>,
    /// Global cap on concurrently open sockets
    pub connection_semaphore: Arc<Semaphore>,
    pub trust_forwarded_for: bool,
    pub max_message_bytes: usize,
    pub max_protocol_errors: u32,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Response {
    let permit = match app_state.connection_semaphore.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Connection from {} refused: server full", peer);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };
    let addr = client_addr(&headers, peer, app_state.trust_forwarded_for);

    ws.max_message_size(app_state.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, app_state, addr, permit))
        .into_response()
}

async fn handle_socket(
    socket: WebSocket,
    app_state: AppState,
    addr: IpAddr,
    _permit: OwnedSemaphorePermit,
) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the session exists so no targeted message is missed
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .game_tx
        .send(GameCommand::Connect {
            addr,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Connect command");
        return;
    }

    let my_id = match resp_rx.await {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            tracing::debug!("Closing socket: {}", e);
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            tracing::error!("Failed to receive session id");
            return;
        }
    };

    let mut protocol_errors: u32 = 0;
    // Shared traffic is held back until this session's own snapshot is out
    let mut joined = false;

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        protocol_errors += 1;
                        if protocol_errors > app_state.max_protocol_errors {
                            tracing::warn!("Session {} sent too many malformed messages", my_id);
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Session {} socket error: {}", my_id, e);
                        break;
                    }
                    _ => continue, // Ignore ping/pong
                };

                let cmd = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => command_for(my_id, client_msg),
                    Err(e) => {
                        protocol_errors += 1;
                        tracing::debug!(
                            "{}",
                            ArenaError::ProtocolError(format!("session {}: {}", my_id, e))
                        );
                        if protocol_errors > app_state.max_protocol_errors {
                            tracing::warn!("Session {} sent too many malformed messages", my_id);
                            break;
                        }
                        continue;
                    }
                };

                if app_state.game_tx.send(cmd).await.is_err() {
                    break;
                }
            }

            // Server -> Client (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(GameBroadcast::Message { to, msg }) => {
                        if !forwards(to, &msg, my_id, &mut joined) {
                            continue; // Not for this client
                        }
                        match serde_json::to_string(msg.as_ref()) {
                            Ok(json) => {
                                if sink.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::error!("Failed to encode message: {}", e),
                        }
                    }
                    Ok(GameBroadcast::Close { session_id }) => {
                        if session_id == my_id {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Session {} lagged by {} messages", my_id, n);
                        // A skipped item may have been this session's close
                        if !resync(&app_state, my_id).await {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect; a no-op if the session already ended
    let _ = app_state
        .game_tx
        .send(GameCommand::Disconnect { session_id: my_id })
        .await;
}

/// Whether a broadcast item goes out on this session's socket. Items for
/// everyone only flow once the session's snapshot has been forwarded, so a
/// joining client always sees its snapshot first.
fn forwards(to: Audience, msg: &ServerMsg, session: SessionId, joined: &mut bool) -> bool {
    if !to.includes(session) {
        return false;
    }
    match to {
        Audience::Only(_) => {
            if matches!(msg, ServerMsg::Snapshot(_)) {
                *joined = true;
            }
            true
        }
        Audience::All | Audience::AllExcept(_) => *joined,
    }
}

/// Ask the game loop whether the session survived a lag, queueing a fresh
/// snapshot if so. A dead game loop counts as ended.
async fn resync(app_state: &AppState, session_id: SessionId) -> bool {
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .game_tx
        .send(GameCommand::Resync {
            session_id,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        return false;
    }
    resp_rx.await.unwrap_or(false)
}

fn command_for(session_id: SessionId, msg: ClientMsg) -> GameCommand {
    match msg {
        ClientMsg::Join { name, color } => GameCommand::Join {
            session_id,
            name,
            color,
        },
        // The reported size is ignored; the server's size is authoritative
        ClientMsg::Move {
            x, y, segments, ..
        } => GameCommand::Move {
            session_id,
            x,
            y,
            segments,
        },
        ClientMsg::Consume { food_id } => GameCommand::Consume {
            session_id,
            food_id,
        },
        ClientMsg::Eliminate { target_id } => GameCommand::Eliminate {
            session_id,
            target_id,
        },
        ClientMsg::Heartbeat => GameCommand::Heartbeat { session_id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left_msg(id: SessionId) -> ServerMsg {
        ServerMsg::PlayerLeft(arena_shared::protocol::PlayerLeftMsg { id })
    }

    fn snapshot(self_id: SessionId) -> ServerMsg {
        ServerMsg::Snapshot(arena_shared::protocol::SnapshotMsg {
            protocol_version: arena_shared::protocol::PROTOCOL_VERSION,
            self_id,
            players: vec![],
            food: vec![],
            world: Default::default(),
        })
    }

    #[test]
    fn shared_traffic_waits_for_own_snapshot() {
        let mut joined = false;
        let other = left_msg(9);

        assert!(!forwards(Audience::All, &other, 3, &mut joined));
        assert!(!forwards(Audience::AllExcept(9), &other, 3, &mut joined));
        assert!(!forwards(Audience::Only(9), &snapshot(9), 3, &mut joined));
        assert!(!joined, "another session's snapshot does not count");

        // Unicasts such as playerCount are never held back
        let count = ServerMsg::PlayerCount(arena_shared::protocol::PlayerCountMsg { count: 1 });
        assert!(forwards(Audience::Only(3), &count, 3, &mut joined));
        assert!(!joined);

        assert!(forwards(Audience::Only(3), &snapshot(3), 3, &mut joined));
        assert!(joined);
        assert!(forwards(Audience::All, &other, 3, &mut joined));
        assert!(forwards(Audience::AllExcept(9), &other, 3, &mut joined));
        assert!(!forwards(Audience::AllExcept(3), &other, 3, &mut joined));
    }

    #[test]
    fn move_ignores_reported_size() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"move","x":3.0,"y":4.0,"size":999.0}"#).unwrap();
        match command_for(7, msg) {
            GameCommand::Move {
                session_id,
                x,
                y,
                segments,
            } => {
                assert_eq!(session_id, 7);
                assert_eq!((x, y), (3.0, 4.0));
                assert!(segments.is_none());
            }
            other => panic!("Expected Move, got {:?}", other),
        }
    }

    #[test]
    fn advisory_messages_carry_session() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"eliminate","targetId":4}"#).unwrap();
        assert!(matches!(
            command_for(2, msg),
            GameCommand::Eliminate {
                session_id: 2,
                target_id: 4
            }
        ));
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(
            command_for(2, msg),
            GameCommand::Heartbeat { session_id: 2 }
        ));
    }
}
