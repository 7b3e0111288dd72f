use std::time::Instant;

use arena_shared::protocol::{PlayerWire, SessionId};
use arena_shared::vec2::Vec2;

/// Authoritative player entity, bound 1:1 to a joined session.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: SessionId,
    pub name: String,
    pub color: String,
    /// Last accepted position
    pub pos: Vec2,
    pub size: f64,
    pub score: u64,
    /// Trail reported by the client, relayed to others
    pub segments: Vec<Vec2>,
    /// When `pos` was last accepted
    pub last_update: Instant,
    /// Growth-guard baseline
    pub last_size: f64,
    pub last_size_update: Instant,
}

impl Player {
    pub fn new(
        id: SessionId,
        name: String,
        color: String,
        pos: Vec2,
        size: f64,
        now: Instant,
    ) -> Self {
        Self {
            id,
            name,
            color,
            pos,
            size,
            score: 0,
            segments: Vec::new(),
            last_update: now,
            last_size: size,
            last_size_update: now,
        }
    }

    /// Grow and move the growth-guard baseline with it.
    pub fn grow_to(&mut self, size: f64, now: Instant) {
        self.size = size;
        self.last_size = size;
        self.last_size_update = now;
    }

    pub fn to_wire(&self) -> PlayerWire {
        PlayerWire {
            id: self.id,
            name: self.name.clone(),
            x: self.pos.x,
            y: self.pos.y,
            size: self.size,
            score: self.score,
            color: self.color.clone(),
            segments: self.segments.clone(),
        }
    }
}

/// Trim, drop control characters and cap the length. Empty names become "Unnamed".
pub fn sanitize_name(raw: &str, max_len: usize) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(max_len)
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        "Unnamed".to_string()
    } else {
        cleaned
    }
}

/// Accept `#rgb` or `#rrggbb` hex colors only.
pub fn sanitize_color(raw: &str) -> Option<String> {
    let hex = raw.trim().strip_prefix('#')?;
    if (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{}", hex.to_ascii_lowercase()))
    } else {
        None
    }
}

/// Generate a color from player ID using golden angle hue distribution.
pub fn color_from_id(id: SessionId) -> String {
    let hue = id.wrapping_mul(137) % 360;
    format!("#{:06x}", hsv_to_rgb(hue as f64, 0.65, 0.95))
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> u32 {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    let ri = ((r + m) * 255.0).round() as u32;
    let gi = ((g + m) * 255.0).round() as u32;
    let bi = ((b + m) * 255.0).round() as u32;

    (ri << 16) | (gi << 8) | bi
}
