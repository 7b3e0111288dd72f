//! Collision resolution, run synchronously after every accepted move.
//!
//! Food within a player's radius is consumed; players overlapping another
//! player are eliminated when the other side dominates them by the configured
//! margin. Victims are removed from the store as soon as they are resolved,
//! so later checks against the same id find nothing.

use std::time::Instant;

use arena_shared::protocol::{
    FoodDeltaMsg, FoodId, PlayerEliminatedMsg, PlayerSizeMsg, ServerMsg, SessionId,
};
use arena_shared::vec2::distance;

use crate::dispatch::Dispatch;
use crate::error::ArenaError;
use crate::movement::{check_growth, Rejection};
use crate::rate_limit::ActionKind;
use crate::state::{food_added, GameState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionRules {
    /// The larger player must exceed the smaller's size by this factor
    pub dominance_margin: f64,
    /// Share of the victim's size awarded to the eliminator
    pub size_share: f64,
    /// Share of the victim's score awarded to the eliminator
    pub score_share: f64,
    /// A removed player drops floor(size / drop_divisor) food items
    pub drop_divisor: f64,
    /// Drops land within size * scatter_radius_factor of the last position
    pub scatter_radius_factor: f64,
}

impl Default for CollisionRules {
    fn default() -> Self {
        Self {
            dominance_margin: 1.2,
            size_share: 0.5,
            score_share: 0.5,
            drop_divisor: 1.0,
            scatter_radius_factor: 2.0,
        }
    }
}

impl CollisionRules {
    pub fn validate(&self) -> Result<(), String> {
        if !self.dominance_margin.is_finite() || self.dominance_margin < 1.0 {
            return Err("dominance_margin must be finite and >= 1".to_string());
        }
        for (name, value) in [
            ("size_share", self.size_share),
            ("score_share", self.score_share),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within [0, 1]", name));
            }
        }
        if !self.drop_divisor.is_finite() || self.drop_divisor <= 0.0 {
            return Err("drop_divisor must be finite and > 0".to_string());
        }
        if !self.scatter_radius_factor.is_finite() || self.scatter_radius_factor < 0.0 {
            return Err("scatter_radius_factor must be finite and >= 0".to_string());
        }
        Ok(())
    }

    pub fn dominates(&self, size: f64, other: f64) -> bool {
        size > other * self.dominance_margin
    }

    pub fn drop_count(&self, size: f64) -> usize {
        (size / self.drop_divisor).floor().max(0.0) as usize
    }

    pub fn scatter_radius(&self, size: f64) -> f64 {
        size * self.scatter_radius_factor
    }
}

impl GameState {
    /// Resolve every collision involving `mover` at its current position.
    pub(crate) fn resolve_collisions(&mut self, mover: SessionId, now: Instant, out: &mut Dispatch) {
        let Some(player) = self.players.get(&mover) else {
            return;
        };
        let (pos, size) = (player.pos, player.size);

        let touching: Vec<FoodId> = self
            .food
            .values()
            .filter(|food| distance(pos, food.pos) < size)
            .map(|food| food.id)
            .collect();
        for food_id in touching {
            match self.consume_food(mover, food_id, now, out) {
                Ok(()) => {}
                Err(ArenaError::RateLimitExceeded(kind)) => {
                    tracing::debug!("Player {} hit {:?} limit", mover, kind);
                    break;
                }
                Err(e) => tracing::debug!("Player {} consumption: {}", mover, e),
            }
        }

        let others: Vec<SessionId> = self
            .players
            .keys()
            .copied()
            .filter(|id| *id != mover)
            .collect();
        let rules = self.config.collision;
        for other in others {
            let Some(me) = self.players.get(&mover) else {
                break;
            };
            let Some(them) = self.players.get(&other) else {
                continue;
            };
            if distance(me.pos, them.pos) >= me.size.max(them.size) {
                continue;
            }

            let (winner, loser) = if rules.dominates(me.size, them.size) {
                (mover, other)
            } else if rules.dominates(them.size, me.size) {
                (other, mover)
            } else {
                // Neither side dominates: plain bounce
                continue;
            };

            if let Err(e) = self.eliminate(winner, loser, now, out) {
                tracing::debug!("Elimination of {} by {} skipped: {}", loser, winner, e);
            }
        }
    }

    /// Client-asserted consumption, re-validated against server positions.
    /// The claim is charged to the consume limit before it is looked at.
    pub fn handle_consume(
        &mut self,
        id: SessionId,
        food_id: FoodId,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        self.touch(id, now)?;
        if !self.limiter.try_consume(id, ActionKind::Consume, now) {
            return Err(ArenaError::RateLimitExceeded(ActionKind::Consume));
        }
        let player = self
            .players
            .get(&id)
            .ok_or_else(|| ArenaError::ProtocolError("consume before join".to_string()))?;
        let food = self
            .food
            .get(&food_id)
            .ok_or_else(|| ArenaError::ProtocolError(format!("unknown food {}", food_id)))?;
        if distance(player.pos, food.pos) >= player.size {
            return Err(Rejection::OutOfReach.into());
        }
        self.apply_consumption(id, food_id, now, out)
    }

    /// Client-asserted elimination. Advisory only: proximity and dominance
    /// are checked against server state before anything happens, and every
    /// claim counts against the eliminate limit.
    pub fn handle_eliminate(
        &mut self,
        id: SessionId,
        target: SessionId,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        self.touch(id, now)?;
        if !self.limiter.try_consume(id, ActionKind::Eliminate, now) {
            return Err(ArenaError::RateLimitExceeded(ActionKind::Eliminate));
        }
        if !self.players.contains_key(&id) {
            return Err(ArenaError::ProtocolError("eliminate before join".to_string()));
        }
        if target == id {
            return Err(ArenaError::ProtocolError("cannot eliminate self".to_string()));
        }
        self.check_elimination(id, target)?;
        self.apply_elimination(id, target, now, out)
    }

    /// Collision-detected consumption, metered by the consume limit.
    pub(crate) fn consume_food(
        &mut self,
        eater: SessionId,
        food_id: FoodId,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        if !self.players.contains_key(&eater) {
            return Err(ArenaError::StaleSession(eater));
        }
        if !self.food.contains_key(&food_id) {
            return Err(ArenaError::ProtocolError(format!("unknown food {}", food_id)));
        }
        if !self.limiter.try_consume(eater, ActionKind::Consume, now) {
            return Err(ArenaError::RateLimitExceeded(ActionKind::Consume));
        }
        self.apply_consumption(eater, food_id, now, out)
    }

    /// Remove a food item on behalf of `eater`. The food is spent even if the
    /// growth guard denies the size increase.
    fn apply_consumption(
        &mut self,
        eater: SessionId,
        food_id: FoodId,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        let Some(food) = self.food.remove(&food_id) else {
            return Err(ArenaError::ProtocolError(format!("unknown food {}", food_id)));
        };

        let mut delta = FoodDeltaMsg {
            removed: vec![food.id],
            added: Vec::new(),
        };
        if food.ambient {
            delta.added = self.spawn_ambient(1);
        }

        let growth = self.config.food_growth;
        let score_gain = u64::from(food.value) * self.config.score_per_food_value;
        let mut result = Ok(());
        if let Some(player) = self.players.get_mut(&eater) {
            let new_size = player.size + growth;
            match check_growth(&self.config.movement, player, new_size, now) {
                Ok(()) => {
                    player.grow_to(new_size, now);
                    player.score += score_gain;
                    out.to_all(ServerMsg::PlayerSize(PlayerSizeMsg {
                        id: eater,
                        size: player.size,
                        score: player.score,
                    }));
                }
                Err(rejection) => {
                    tracing::warn!("Player {} growth reverted: {}", eater, rejection);
                    result = Err(rejection.into());
                }
            }
        }

        out.to_all(ServerMsg::FoodDelta(delta));
        result
    }

    /// Collision-detected elimination, metered by the eliminate limit once
    /// the pair qualifies.
    pub(crate) fn eliminate(
        &mut self,
        winner: SessionId,
        loser: SessionId,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        self.check_elimination(winner, loser)?;
        if !self.limiter.try_consume(winner, ActionKind::Eliminate, now) {
            return Err(ArenaError::RateLimitExceeded(ActionKind::Eliminate));
        }
        self.apply_elimination(winner, loser, now, out)
    }

    /// Both players exist, overlap, and `winner` dominates `loser`.
    fn check_elimination(&self, winner: SessionId, loser: SessionId) -> Result<(), ArenaError> {
        let a = self
            .players
            .get(&winner)
            .ok_or(ArenaError::StaleSession(winner))?;
        let b = self
            .players
            .get(&loser)
            .ok_or(ArenaError::StaleSession(loser))?;
        if winner == loser || distance(a.pos, b.pos) >= a.size.max(b.size) {
            return Err(Rejection::OutOfReach.into());
        }
        if !self.config.collision.dominates(a.size, b.size) {
            return Err(Rejection::NotDominant {
                size: a.size,
                other: b.size,
            }
            .into());
        }
        Ok(())
    }

    /// The victim's size becomes a scatter drop and its session is closed
    /// without a second food drop.
    fn apply_elimination(
        &mut self,
        winner: SessionId,
        loser: SessionId,
        now: Instant,
        out: &mut Dispatch,
    ) -> Result<(), ArenaError> {
        let rules = self.config.collision;
        let Some(victim) = self.players.remove(&loser) else {
            return Err(ArenaError::StaleSession(loser));
        };
        let Some(eliminator) = self.players.get_mut(&winner) else {
            return Err(ArenaError::StaleSession(winner));
        };
        eliminator.grow_to(eliminator.size + victim.size * rules.size_share, now);
        eliminator.score += (victim.score as f64 * rules.score_share).floor() as u64;
        let announcement = PlayerEliminatedMsg {
            eliminated_id: loser,
            eliminator_id: winner,
            eliminator_size: eliminator.size,
            eliminator_score: eliminator.score,
        };

        let added = self.spawn_scatter(
            victim.pos,
            rules.drop_count(victim.size),
            rules.scatter_radius(victim.size),
            &victim.color,
        );

        out.to_all(ServerMsg::PlayerEliminated(announcement));
        out.to_all(food_added(added));
        self.discard_session(loser);
        out.close(loser);

        tracing::info!(
            "Player {} eliminated by {} (size {:.1})",
            loser,
            winner,
            victim.size
        );
        Ok(())
    }
}
