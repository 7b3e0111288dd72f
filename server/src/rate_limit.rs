//! Per-session action throttling.
//!
//! Each (session, action kind) pair owns a fixed window counter. Windows are
//! measured against the wall clock passed in by the caller, so they stay
//! correct no matter how far behind the game loop is running.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use arena_shared::protocol::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Movement,
    Consume,
    Eliminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn per_second(max: u32) -> Self {
        Self {
            max,
            window: Duration::from_secs(1),
        }
    }
}

/// Limits for every action kind. Deliberately generous so legitimate
/// high-frequency play is never throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub movement: RateLimit,
    pub consume: RateLimit,
    pub eliminate: RateLimit,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            movement: RateLimit::per_second(300),
            consume: RateLimit::per_second(30),
            eliminate: RateLimit::per_second(15),
        }
    }
}

impl RateLimits {
    pub fn get(&self, kind: ActionKind) -> RateLimit {
        match kind {
            ActionKind::Movement => self.movement,
            ActionKind::Consume => self.consume,
            ActionKind::Eliminate => self.eliminate,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, limit) in [
            ("movement", self.movement),
            ("consume", self.consume),
            ("eliminate", self.eliminate),
        ] {
            if limit.max == 0 {
                return Err(format!("{} rate limit must be > 0", name));
            }
            if limit.window.is_zero() {
                return Err(format!("{} rate window must be > 0", name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    window_start: Instant,
}

pub struct ActionLimiter {
    limits: RateLimits,
    counters: HashMap<(SessionId, ActionKind), Counter>,
}

impl ActionLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            counters: HashMap::new(),
        }
    }

    /// Count one action. Returns false once the session has exceeded the
    /// limit for this kind within the current window.
    pub fn try_consume(&mut self, session: SessionId, kind: ActionKind, now: Instant) -> bool {
        let limit = self.limits.get(kind);
        let counter = self.counters.entry((session, kind)).or_insert(Counter {
            count: 0,
            window_start: now,
        });

        if now.saturating_duration_since(counter.window_start) > limit.window {
            counter.count = 0;
            counter.window_start = now;
        }

        counter.count = counter.count.saturating_add(1);
        counter.count <= limit.max
    }

    /// Drop every counter owned by a session.
    pub fn remove_session(&mut self, session: SessionId) {
        self.counters.retain(|(id, _), _| *id != session);
    }

    pub fn tracks(&self, session: SessionId) -> bool {
        self.counters.keys().any(|(id, _)| *id == session)
    }
}
