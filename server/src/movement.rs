//! Server-side checks on client-reported movement and growth.
//!
//! The validator is intentionally lenient. It only catches gross speed
//! manipulation and out-of-bounds positions; ordinary frame drops and network
//! jitter widen the allowance instead of producing corrections.

use std::time::Instant;

use arena_shared::config::WorldInfo;
use arena_shared::vec2::{distance, Vec2};
use thiserror::Error;

use crate::player::Player;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementPolicy {
    /// Nominal movement speed (units/s)
    pub base_velocity: f64,
    /// Gaps longer than this (seconds) start widening the allowance
    pub jitter_threshold: f64,
    /// Allowance multiplier gained per second of gap
    pub jitter_scale: f64,
    /// Cap on the jitter allowance multiplier
    pub max_tolerance: f64,
    /// Only distances beyond `allowed * extreme_speed_factor` are rejected
    pub extreme_speed_factor: f64,
    /// Maximum size gained per second through consumption
    pub max_growth_rate: f64,
    /// Floor on elapsed time (seconds) to avoid dividing by zero
    pub min_elapsed: f64,
}

impl Default for MovementPolicy {
    fn default() -> Self {
        Self {
            base_velocity: 100.0,
            jitter_threshold: 0.1,
            jitter_scale: 5.0,
            max_tolerance: 3.0,
            extreme_speed_factor: 10.0,
            max_growth_rate: 50.0,
            min_elapsed: 0.001,
        }
    }
}

impl MovementPolicy {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("base_velocity", self.base_velocity),
            ("jitter_scale", self.jitter_scale),
            ("extreme_speed_factor", self.extreme_speed_factor),
            ("max_growth_rate", self.max_growth_rate),
            ("min_elapsed", self.min_elapsed),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be finite and > 0", name));
            }
        }
        if !self.jitter_threshold.is_finite() || self.jitter_threshold < 0.0 {
            return Err("jitter_threshold must be finite and >= 0".to_string());
        }
        if !self.max_tolerance.is_finite() || self.max_tolerance < 1.0 {
            return Err("max_tolerance must be finite and >= 1".to_string());
        }
        Ok(())
    }

    /// Allowance multiplier for a gap of `elapsed` seconds. 1.0 for normal
    /// update cadence, growing with the gap up to `max_tolerance`.
    pub fn tolerance_multiplier(&self, elapsed: f64) -> f64 {
        if elapsed > self.jitter_threshold {
            (elapsed * self.jitter_scale).clamp(1.0, self.max_tolerance)
        } else {
            1.0
        }
    }

    /// Distance a player may legitimately cover in `elapsed` seconds, before
    /// the extreme-speed factor is applied.
    pub fn max_allowed_distance(&self, elapsed: f64) -> f64 {
        self.base_velocity * elapsed * self.tolerance_multiplier(elapsed)
    }

    fn elapsed_since(&self, earlier: Instant, now: Instant) -> f64 {
        now.saturating_duration_since(earlier)
            .as_secs_f64()
            .max(self.min_elapsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Rejection {
    #[error("position is not a finite number")]
    NonFinite,
    #[error("position ({x:.1}, {y:.1}) is outside the playable area")]
    OutOfBounds { x: f64, y: f64 },
    #[error("moved {distance:.1} units, limit {limit:.1}")]
    TooFast { distance: f64, limit: f64 },
    #[error("growth rate {rate:.1}/s exceeds {max:.1}/s")]
    GrowthTooFast { rate: f64, max: f64 },
    #[error("target is not within reach")]
    OutOfReach,
    #[error("size {size:.1} does not dominate {other:.1}")]
    NotDominant { size: f64, other: f64 },
}

/// Check a proposed position against the player's last accepted one.
/// Never mutates the player.
pub fn validate_move(
    policy: &MovementPolicy,
    world: &WorldInfo,
    player: &Player,
    proposed: Vec2,
    now: Instant,
) -> Result<(), Rejection> {
    if !proposed.is_finite() {
        return Err(Rejection::NonFinite);
    }

    let elapsed = policy.elapsed_since(player.last_update, now);
    let moved = distance(player.pos, proposed);
    let limit = policy.max_allowed_distance(elapsed) * policy.extreme_speed_factor;
    if moved > limit {
        return Err(Rejection::TooFast {
            distance: moved,
            limit,
        });
    }

    if !world.contains(proposed.x, proposed.y) {
        return Err(Rejection::OutOfBounds {
            x: proposed.x,
            y: proposed.y,
        });
    }

    Ok(())
}

/// Growth-rate guard applied when a player consumes food.
pub fn check_growth(
    policy: &MovementPolicy,
    player: &Player,
    new_size: f64,
    now: Instant,
) -> Result<(), Rejection> {
    let elapsed = policy.elapsed_since(player.last_size_update, now);
    let rate = (new_size - player.last_size) / elapsed;
    if rate > policy.max_growth_rate {
        return Err(Rejection::GrowthTooFast {
            rate,
            max: policy.max_growth_rate,
        });
    }
    Ok(())
}
