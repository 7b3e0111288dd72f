//! Food items and the spawner that places them.

use std::f64::consts::TAU;

use arena_shared::config::WorldInfo;
use arena_shared::protocol::{FoodId, FoodWire};
use arena_shared::vec2::{add, clamp_symmetric, from_angle, scale, vec2, Vec2};
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub id: FoodId,
    pub pos: Vec2,
    pub value: u32,
    pub color: String,
    /// Part of the maintained ambient population (as opposed to a scatter drop)
    pub ambient: bool,
}

impl Food {
    pub fn to_wire(&self) -> FoodWire {
        FoodWire {
            id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            value: self.value,
            color: self.color.clone(),
        }
    }
}

pub fn random_color(rng: &mut impl Rng) -> String {
    format!("#{:06x}", rng.gen_range(0..=0xFF_FFFFu32))
}

/// Places food and hands out unique ids. Does not own the food map.
pub struct FoodSpawner {
    world: WorldInfo,
    max_ambient_value: u32,
    next_id: FoodId,
}

impl FoodSpawner {
    pub fn new(world: WorldInfo, max_ambient_value: u32) -> Self {
        Self {
            world,
            max_ambient_value: max_ambient_value.max(1),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> FoodId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Uniformly random positions across the whole world.
    pub fn spawn_ambient(&mut self, count: usize, rng: &mut impl Rng) -> Vec<Food> {
        let half = self.world.world_size / 2.0;
        (0..count)
            .map(|_| Food {
                id: self.allocate_id(),
                pos: vec2(rng.gen_range(-half..=half), rng.gen_range(-half..=half)),
                value: rng.gen_range(1..=self.max_ambient_value),
                color: random_color(rng),
                ambient: true,
            })
            .collect()
    }

    /// Ring of food around `origin` at uniform random angles and radii in
    /// `[0, max_radius]`, clamped into the playable area.
    pub fn spawn_scatter(
        &mut self,
        origin: Vec2,
        count: usize,
        max_radius: f64,
        color: &str,
        rng: &mut impl Rng,
    ) -> Vec<Food> {
        let limit = self.world.playable_half_extent();
        let max_radius = max_radius.max(0.0);
        (0..count)
            .map(|_| {
                let angle = rng.gen_range(0.0..TAU);
                let radius = rng.gen_range(0.0..=max_radius);
                let pos = clamp_symmetric(add(origin, scale(from_angle(angle), radius)), limit);
                Food {
                    id: self.allocate_id(),
                    pos,
                    value: 1,
                    color: color.to_string(),
                    ambient: false,
                }
            })
            .collect()
    }
}
