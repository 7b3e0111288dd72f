//! Connection admission: per-address sliding window of recent connects.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

pub struct ConnectionLimiter {
    max_per_window: usize,
    window: Duration,
    recent: HashMap<IpAddr, VecDeque<Instant>>,
}

impl ConnectionLimiter {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            recent: HashMap::new(),
        }
    }

    /// Record a connection attempt. Rejected attempts are not recorded.
    pub fn admit(&mut self, addr: IpAddr, now: Instant) -> bool {
        let window = self.window;
        let times = self.recent.entry(addr).or_default();
        while let Some(&oldest) = times.front() {
            if now.saturating_duration_since(oldest) >= window {
                times.pop_front();
            } else {
                break;
            }
        }

        if times.len() >= self.max_per_window {
            return false;
        }
        times.push_back(now);
        true
    }

    /// Forget addresses whose whole window has expired.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.recent.retain(|_, times| {
            times.retain(|&t| now.saturating_duration_since(t) < window);
            !times.is_empty()
        });
    }

    pub fn tracked_addresses(&self) -> usize {
        self.recent.len()
    }
}

/// Address used for connection limiting. Behind a reverse proxy the peer is
/// the proxy itself, so the first X-Forwarded-For entry is used when trusted.
pub fn client_addr(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(addr) = forwarded {
            return addr;
        }
    }
    peer.ip()
}
