//! Session registry: join, leave and session teardown.

use std::time::Instant;

use arena_shared::protocol::{PlayerLeftMsg, PlayerWire, ServerMsg, SessionId};
use arena_shared::vec2::vec2;
use rand::Rng;

use crate::dispatch::Dispatch;
use crate::error::ArenaError;
use crate::player::{color_from_id, sanitize_color, sanitize_name, Player};
use crate::state::{food_added, GameState};

impl GameState {
    /// Create the player for an admitted session, unicast the snapshot and
    /// announce the newcomer to everyone else.
    pub fn join(
        &mut self,
        id: SessionId,
        name: &str,
        color: Option<&str>,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<PlayerWire, ArenaError> {
        self.touch(id, now)?;
        if self.players.contains_key(&id) {
            return Err(ArenaError::ProtocolError(format!(
                "session {} already joined",
                id
            )));
        }

        let half = self
            .config
            .spawn_half_extent
            .min(self.config.world.playable_half_extent());
        let pos = vec2(
            self.rng.gen_range(-half..=half),
            self.rng.gen_range(-half..=half),
        );
        let color = color
            .and_then(sanitize_color)
            .unwrap_or_else(|| color_from_id(id));
        let name = sanitize_name(name, self.config.max_name_len);

        let player = Player::new(id, name, color, pos, self.config.world.base_player_size, now);
        let wire = player.to_wire();
        self.players.insert(id, player);

        out.to_one(id, ServerMsg::Snapshot(self.snapshot_for(id)));
        out.to_others(id, ServerMsg::PlayerJoined(wire.clone()));
        tracing::info!("Player {} joined as {:?}", id, wire.name);
        Ok(wire)
    }

    /// Remove the player and scatter its food drop. Returns false (and does
    /// nothing) when the session has no player.
    pub fn leave(&mut self, id: SessionId, out: &mut Dispatch) -> bool {
        let Some(player) = self.players.remove(&id) else {
            return false;
        };

        let rules = self.config.collision;
        let added = self.spawn_scatter(
            player.pos,
            rules.drop_count(player.size),
            rules.scatter_radius(player.size),
            &player.color,
        );

        out.to_all(ServerMsg::PlayerLeft(PlayerLeftMsg { id }));
        if !added.is_empty() {
            out.to_all(food_added(added));
        }
        tracing::info!("Player {} left", id);
        true
    }

    /// Transport closed or timed out: leave, then forget the session and its
    /// rate counters. Any later action from this id is a no-op.
    pub fn end_session(&mut self, id: SessionId, out: &mut Dispatch) -> bool {
        let left = self.leave(id, out);
        self.discard_session(id) || left
    }

    /// Forget a session without a food drop (used after elimination).
    pub(crate) fn discard_session(&mut self, id: SessionId) -> bool {
        self.limiter.remove_session(id);
        self.sessions.remove(&id).is_some()
    }
}
