use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::Instant;

use arena_shared::protocol::{
    FoodDeltaMsg, FoodId, FoodWire, ForcePositionMsg, PlayerCountMsg, PlayerWire, PlayersMsg,
    ServerMsg, SessionId, SnapshotMsg, PROTOCOL_VERSION,
};
use arena_shared::vec2::{vec2, Vec2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::ServerConfig;
use crate::dispatch::Dispatch;
use crate::error::ArenaError;
use crate::food::{Food, FoodSpawner};
use crate::gateway::ConnectionLimiter;
use crate::movement::validate_move;
use crate::player::Player;
use crate::rate_limit::{ActionKind, ActionLimiter};
use crate::status::StatusReport;

/// One admitted connection, with or without a joined player.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub addr: IpAddr,
    pub connected_at: Instant,
    pub last_activity: Instant,
}

/// Central game state owned by the game loop task.
///
/// Every mutation goes through `&mut self`, and the game loop is the only
/// owner, so each action's validate/mutate/collide/spawn/broadcast pipeline
/// completes before the next action is looked at.
pub struct GameState {
    pub config: ServerConfig,
    pub players: BTreeMap<SessionId, Player>,
    pub food: BTreeMap<FoodId, Food>,
    pub sessions: HashMap<SessionId, Session>,
    pub rng: ChaCha8Rng,
    pub(crate) spawner: FoodSpawner,
    pub(crate) limiter: ActionLimiter,
    pub(crate) gateway: ConnectionLimiter,
    next_session_id: SessionId,
    started_at: Instant,
}

impl GameState {
    pub fn new(config: ServerConfig, now: Instant) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        Self::with_rng(config, rng, now)
    }

    /// Build a world with an explicit RNG, populated with the ambient food target.
    pub fn with_rng(config: ServerConfig, rng: ChaCha8Rng, now: Instant) -> Self {
        let spawner = FoodSpawner::new(config.world, config.max_ambient_food_value);
        let limiter = ActionLimiter::new(config.rate_limits);
        let gateway =
            ConnectionLimiter::new(config.max_connections_per_addr, config.connection_window);
        let mut state = Self {
            config,
            players: BTreeMap::new(),
            food: BTreeMap::new(),
            sessions: HashMap::new(),
            rng,
            spawner,
            limiter,
            gateway,
            next_session_id: 1,
            started_at: now,
        };
        let initial = state.config.food_target;
        state.spawn_ambient(initial);
        state
    }

    /// Gateway admission. Creates a bare session on success.
    pub fn connect(&mut self, addr: IpAddr, now: Instant) -> Result<SessionId, ArenaError> {
        if !self.gateway.admit(addr, now) {
            return Err(ArenaError::ConnectionRejected(addr));
        }
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(
            id,
            Session {
                id,
                addr,
                connected_at: now,
                last_activity: now,
            },
        );
        Ok(id)
    }

    /// Record activity. Fails for sessions that have already ended.
    pub fn touch(&mut self, id: SessionId, now: Instant) -> Result<(), ArenaError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(ArenaError::StaleSession(id))?;
        session.last_activity = now;
        Ok(())
    }

    /// Movement pipeline: rate limit, validate, apply, collide, broadcast.
    /// Rejections leave the player untouched and queue a `forcePosition`.
    pub fn handle_move(
        &mut self,
        id: SessionId,
        x: f64,
        y: f64,
        segments: Option<Vec<Vec2>>,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        self.touch(id, now)?;
        let player = self
            .players
            .get(&id)
            .ok_or_else(|| ArenaError::ProtocolError("move before join".to_string()))?;
        let current = player.pos;

        if !self.limiter.try_consume(id, ActionKind::Movement, now) {
            out.to_one(id, force_position(current));
            return Err(ArenaError::RateLimitExceeded(ActionKind::Movement));
        }

        let proposed = vec2(x, y);
        if let Err(rejection) = validate_move(
            &self.config.movement,
            &self.config.world,
            player,
            proposed,
            now,
        ) {
            out.to_one(id, force_position(current));
            return Err(rejection.into());
        }

        let max_segments = self.config.max_segments;
        if let Some(player) = self.players.get_mut(&id) {
            player.pos = proposed;
            player.last_update = now;
            if let Some(segments) = segments {
                player.segments = trim_segments(segments, player.size, max_segments);
            }
        }

        self.resolve_collisions(id, now, out);

        // The mover may have been eliminated during collision resolution
        if let Some(player) = self.players.get(&id) {
            out.to_others(id, ServerMsg::PlayerMoved(player.to_wire()));
        }
        Ok(())
    }

    pub fn handle_heartbeat(
        &mut self,
        id: SessionId,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        self.touch(id, now)?;
        out.to_one(
            id,
            ServerMsg::PlayerCount(PlayerCountMsg {
                count: self.players.len() as u32,
            }),
        );
        Ok(())
    }

    /// Queue a full roster to every session as a drift-correction safety net.
    pub fn broadcast_roster(&self, out: &mut Dispatch) {
        if self.players.is_empty() {
            return;
        }
        out.to_all(ServerMsg::SyncPlayers(PlayersMsg {
            players: self.roster(),
        }));
    }

    /// Catch-up for a session that missed broadcasts: a fresh snapshot (food
    /// included) if it has joined. False once the session has ended, so the
    /// caller knows to close its transport.
    pub fn resync(&self, id: SessionId, out: &mut Dispatch) -> bool {
        if !self.sessions.contains_key(&id) {
            return false;
        }
        if self.players.contains_key(&id) {
            out.to_one(id, ServerMsg::Snapshot(self.snapshot_for(id)));
        }
        true
    }

    /// End sessions idle for longer than `max_inactive`, exactly as if they
    /// had disconnected, and close their transports.
    pub fn reap_inactive(&mut self, now: Instant, out: &mut Dispatch) -> Vec<SessionId> {
        let max_inactive = self.config.max_inactive;
        let mut stale: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_activity) > max_inactive)
            .map(|s| s.id)
            .collect();
        stale.sort_unstable();

        for &id in &stale {
            self.end_session(id, out);
            out.close(id);
        }
        self.gateway.prune(now);
        stale
    }

    pub fn roster(&self) -> Vec<PlayerWire> {
        self.players.values().map(Player::to_wire).collect()
    }

    pub fn snapshot_for(&self, id: SessionId) -> SnapshotMsg {
        SnapshotMsg {
            protocol_version: PROTOCOL_VERSION,
            self_id: id,
            players: self.roster(),
            food: self.food.values().map(Food::to_wire).collect(),
            world: self.config.world,
        }
    }

    /// Read-only health summary.
    pub fn status(&self, now: Instant) -> StatusReport {
        StatusReport {
            status: "ok".to_string(),
            player_count: self.players.len(),
            food_count: self.food.len(),
            uptime_seconds: now.saturating_duration_since(self.started_at).as_secs(),
        }
    }

    pub fn ambient_food_count(&self) -> usize {
        self.food.values().filter(|f| f.ambient).count()
    }

    /// Spawn and store ambient food; returns the wire form for a delta.
    pub(crate) fn spawn_ambient(&mut self, count: usize) -> Vec<FoodWire> {
        let spawned = self.spawner.spawn_ambient(count, &mut self.rng);
        self.store_food(spawned)
    }

    /// Spawn and store a scatter drop; returns the wire form for a delta.
    pub(crate) fn spawn_scatter(
        &mut self,
        origin: Vec2,
        count: usize,
        max_radius: f64,
        color: &str,
    ) -> Vec<FoodWire> {
        let spawned = self
            .spawner
            .spawn_scatter(origin, count, max_radius, color, &mut self.rng);
        self.store_food(spawned)
    }

    fn store_food(&mut self, spawned: Vec<Food>) -> Vec<FoodWire> {
        spawned
            .into_iter()
            .map(|food| {
                let wire = food.to_wire();
                self.food.insert(food.id, food);
                wire
            })
            .collect()
    }
}

fn force_position(pos: Vec2) -> ServerMsg {
    ServerMsg::ForcePosition(ForcePositionMsg { x: pos.x, y: pos.y })
}

pub(crate) fn food_added(added: Vec<FoodWire>) -> ServerMsg {
    ServerMsg::FoodDelta(FoodDeltaMsg {
        removed: Vec::new(),
        added,
    })
}

/// Segments are relayed as-is, capped by size. Any non-finite point drops the list.
fn trim_segments(mut segments: Vec<Vec2>, size: f64, max_segments: usize) -> Vec<Vec2> {
    if segments.iter().any(|s| !s.is_finite()) {
        return Vec::new();
    }
    let by_size = ((size / 2.0).floor() as usize).max(1);
    segments.truncate(by_size.min(max_segments));
    segments
}
