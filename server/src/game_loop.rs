use std::net::IpAddr;
use std::time::Instant;

use arena_shared::protocol::{FoodId, SessionId};
use arena_shared::vec2::Vec2;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ServerConfig;
use crate::dispatch::{Dispatch, GameBroadcast};
use crate::error::ArenaError;
use crate::state::GameState;
use crate::status::StatusReport;

/// Commands from client connections to the game loop
#[derive(Debug)]
pub enum GameCommand {
    Connect {
        addr: IpAddr,
        response: oneshot::Sender<Result<SessionId, ArenaError>>,
    },
    Join {
        session_id: SessionId,
        name: String,
        color: Option<String>,
    },
    Move {
        session_id: SessionId,
        x: f64,
        y: f64,
        segments: Option<Vec<Vec2>>,
    },
    Consume {
        session_id: SessionId,
        food_id: FoodId,
    },
    Eliminate {
        session_id: SessionId,
        target_id: SessionId,
    },
    Heartbeat {
        session_id: SessionId,
    },
    Disconnect {
        session_id: SessionId,
    },
    /// Sent by a session task that lagged behind the broadcast channel.
    /// Replies whether the session is still live.
    Resync {
        session_id: SessionId,
        response: oneshot::Sender<bool>,
    },
    Status {
        response: oneshot::Sender<StatusReport>,
    },
}

impl GameCommand {
    /// The session issuing a client action, if any.
    fn issuer(&self) -> Option<SessionId> {
        match *self {
            GameCommand::Join { session_id, .. }
            | GameCommand::Move { session_id, .. }
            | GameCommand::Consume { session_id, .. }
            | GameCommand::Eliminate { session_id, .. }
            | GameCommand::Heartbeat { session_id } => Some(session_id),
            _ => None,
        }
    }
}

/// Run the main game loop. Owns all game state.
///
/// Commands are handled one at a time, so every action's full pipeline
/// (validation, mutation, collision resolution, spawning and broadcast)
/// finishes before the next command is read.
pub async fn run_game_loop(
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<GameBroadcast>,
    config: ServerConfig,
) {
    let mut reaper_interval = tokio::time::interval(config.reaper_interval);
    reaper_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut resync_interval = tokio::time::interval(config.resync_interval);
    resync_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut state = GameState::new(config, Instant::now());
    tracing::info!(
        "World ready: {} food, seed {}",
        state.food.len(),
        state.config.rng_seed
    );

    loop {
        let mut out = Dispatch::new();

        tokio::select! {
            _ = reaper_interval.tick() => {
                let reaped = state.reap_inactive(Instant::now(), &mut out);
                if !reaped.is_empty() {
                    tracing::info!("Reaped {} inactive sessions", reaped.len());
                }
            }

            _ = resync_interval.tick() => {
                state.broadcast_roster(&mut out);
            }

            Some(cmd) = cmd_rx.recv() => {
                handle_command(&mut state, cmd, &mut out);
            }

            else => break,
        }

        publish(&broadcast_tx, out);
    }

    tracing::info!("Game loop ended");
}

fn handle_command(state: &mut GameState, cmd: GameCommand, out: &mut Dispatch) {
    let now = Instant::now();
    let issuer = cmd.issuer();
    let result = match cmd {
        GameCommand::Connect { addr, response } => {
            let admitted = state.connect(addr, now);
            match &admitted {
                Ok(id) => tracing::info!("Session {} connected from {}", id, addr),
                Err(e) => tracing::warn!("{}", e),
            }
            let _ = response.send(admitted);
            Ok(())
        }
        GameCommand::Join {
            session_id,
            name,
            color,
        } => state
            .join(session_id, &name, color.as_deref(), now, out)
            .map(|_| ()),
        GameCommand::Move {
            session_id,
            x,
            y,
            segments,
        } => state.handle_move(session_id, x, y, segments, now, out),
        GameCommand::Consume {
            session_id,
            food_id,
        } => state.handle_consume(session_id, food_id, now, out),
        GameCommand::Eliminate {
            session_id,
            target_id,
        } => state.handle_eliminate(session_id, target_id, now, out),
        GameCommand::Heartbeat { session_id } => state.handle_heartbeat(session_id, now, out),
        GameCommand::Disconnect { session_id } => {
            if state.end_session(session_id, out) {
                tracing::info!("Session {} disconnected", session_id);
            }
            Ok(())
        }
        GameCommand::Resync {
            session_id,
            response,
        } => {
            let live = state.resync(session_id, out);
            if live {
                tracing::info!("Session {} resynced after lag", session_id);
            }
            let _ = response.send(live);
            Ok(())
        }
        GameCommand::Status { response } => {
            let _ = response.send(state.status(now));
            Ok(())
        }
    };

    match result {
        // An ended session that keeps talking missed its close
        Err(ArenaError::StaleSession(id)) if Some(id) == issuer => {
            tracing::debug!("Closing stale session {}", id);
            out.close(id);
        }
        Err(e) => tracing::debug!("Action rejected: {}", e),
        Ok(()) => {}
    }
}

fn publish(broadcast_tx: &broadcast::Sender<GameBroadcast>, out: Dispatch) {
    for item in out.into_items() {
        // No subscribers is fine: nobody is connected
        let _ = broadcast_tx.send(item);
    }
}
