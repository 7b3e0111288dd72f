/// World constants sent to clients in the join snapshot.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WorldInfo {
    /// Full edge length of the square world, centered on the origin
    pub world_size: f64,
    /// Inward margin players may not cross
    pub boundary_buffer: f64,
    pub base_player_size: f64,
}

impl Default for WorldInfo {
    fn default() -> Self {
        Self {
            world_size: 10_000.0,
            boundary_buffer: 50.0,
            base_player_size: 10.0,
        }
    }
}

impl WorldInfo {
    /// Largest absolute coordinate a player may occupy on either axis.
    pub fn playable_half_extent(&self) -> f64 {
        self.world_size / 2.0 - self.boundary_buffer
    }

    /// Whether a point lies inside the world minus the boundary buffer (inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let limit = self.playable_half_extent();
        x.abs() <= limit && y.abs() <= limit
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.world_size.is_finite() || self.world_size <= 0.0 {
            return Err("world_size must be finite and > 0".to_string());
        }
        if !self.boundary_buffer.is_finite() || self.boundary_buffer < 0.0 {
            return Err("boundary_buffer must be finite and >= 0".to_string());
        }
        if self.playable_half_extent() <= 0.0 {
            return Err("boundary_buffer must be smaller than half the world size".to_string());
        }
        if !self.base_player_size.is_finite() || self.base_player_size <= 0.0 {
            return Err("base_player_size must be finite and > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_world_info_is_valid() {
        assert!(WorldInfo::default().validate().is_ok());
    }

    #[test]
    fn buffer_larger_than_half_world_invalid() {
        let info = WorldInfo {
            world_size: 100.0,
            boundary_buffer: 60.0,
            ..Default::default()
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn contains_respects_buffer() {
        let info = WorldInfo::default();
        assert!(info.contains(0.0, 0.0));
        assert!(info.contains(4950.0, -4950.0));
        assert!(!info.contains(4951.0, 0.0));
        assert!(!info.contains(10_000.0, 10_000.0));
    }
}
