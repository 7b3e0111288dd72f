use std::time::Duration;

use arena_shared::config::WorldInfo;

use crate::collision::CollisionRules;
use crate::movement::MovementPolicy;
use crate::rate_limit::RateLimits;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub rng_seed: u64,
    pub world: WorldInfo,
    /// Joining players spawn uniformly in [-spawn_half_extent, spawn_half_extent]²
    pub spawn_half_extent: f64,
    pub max_name_len: usize,
    /// Ambient food population maintained by replenishment
    pub food_target: usize,
    pub max_ambient_food_value: u32,
    /// Size gained per food item
    pub food_growth: f64,
    pub score_per_food_value: u64,
    pub max_segments: usize,
    pub movement: MovementPolicy,
    pub collision: CollisionRules,
    pub rate_limits: RateLimits,
    /// Connections allowed per address within `connection_window`
    pub max_connections_per_addr: usize,
    pub connection_window: Duration,
    /// Concurrent socket cap across all addresses
    pub max_connections: usize,
    pub trust_forwarded_for: bool,
    pub reaper_interval: Duration,
    pub max_inactive: Duration,
    pub resync_interval: Duration,
    pub max_message_bytes: usize,
    /// Malformed messages tolerated before a session is dropped
    pub max_protocol_errors: u32,
    pub command_queue: usize,
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:48765".to_string(),
            rng_seed: 42,
            world: WorldInfo::default(),
            spawn_half_extent: 500.0,
            max_name_len: 20,
            food_target: 1000,
            max_ambient_food_value: 3,
            food_growth: 1.0,
            score_per_food_value: 10,
            max_segments: 200,
            movement: MovementPolicy::default(),
            collision: CollisionRules::default(),
            rate_limits: RateLimits::default(),
            max_connections_per_addr: 20,
            connection_window: Duration::from_secs(60),
            max_connections: 1000,
            trust_forwarded_for: false,
            reaper_interval: Duration::from_secs(5),
            max_inactive: Duration::from_secs(30),
            resync_interval: Duration::from_secs(5),
            max_message_bytes: 16 * 1024,
            max_protocol_errors: 20,
            command_queue: 1024,
            broadcast_capacity: 4096,
        }
    }
}

impl ServerConfig {
    /// Defaults with overrides from `ARENA_LISTEN_ADDR` (or `PORT`),
    /// `ARENA_RNG_SEED` and `ARENA_TRUST_FORWARDED_FOR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("ARENA_LISTEN_ADDR") {
            config.listen_addr = addr;
        } else if let Ok(port) = std::env::var("PORT") {
            config.listen_addr = format!("0.0.0.0:{}", port.trim());
        }
        if let Some(seed) = std::env::var("ARENA_RNG_SEED")
            .ok()
            .and_then(|s| s.trim().parse().ok())
        {
            config.rng_seed = seed;
        }
        if let Ok(flag) = std::env::var("ARENA_TRUST_FORWARDED_FOR") {
            config.trust_forwarded_for = matches!(flag.trim(), "1" | "true" | "yes");
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        self.world.validate()?;
        self.movement.validate()?;
        self.collision.validate()?;
        self.rate_limits.validate()?;

        if !self.spawn_half_extent.is_finite() || self.spawn_half_extent < 0.0 {
            return Err("spawn_half_extent must be finite and >= 0".to_string());
        }
        if self.max_name_len == 0 {
            return Err("max_name_len must be > 0".to_string());
        }
        if !self.food_growth.is_finite() || self.food_growth <= 0.0 {
            return Err("food_growth must be finite and > 0".to_string());
        }
        if self.max_connections_per_addr == 0 || self.max_connections == 0 {
            return Err("connection limits must be > 0".to_string());
        }
        if self.connection_window.is_zero() {
            return Err("connection_window must be > 0".to_string());
        }
        if self.reaper_interval.is_zero() || self.resync_interval.is_zero() {
            return Err("reaper_interval and resync_interval must be > 0".to_string());
        }
        if self.max_inactive <= self.reaper_interval {
            return Err("max_inactive must be longer than reaper_interval".to_string());
        }
        if self.max_message_bytes < 256 {
            return Err("max_message_bytes must be >= 256".to_string());
        }
        if self.command_queue == 0 || self.broadcast_capacity == 0 {
            return Err("channel capacities must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_food_target_is_allowed() {
        let config = ServerConfig {
            food_target: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inactive_window_must_exceed_reaper_interval() {
        let config = ServerConfig {
            max_inactive: Duration::from_secs(1),
            reaper_interval: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn nested_policies_are_validated() {
        let mut config = ServerConfig::default();
        config.collision.dominance_margin = 0.9;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.movement.base_velocity = f64::NAN;
        assert!(config.validate().is_err());
    }
}
