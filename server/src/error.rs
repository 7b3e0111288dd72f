use std::net::IpAddr;

use arena_shared::protocol::SessionId;
use thiserror::Error;

use crate::movement::Rejection;
use crate::rate_limit::ActionKind;

/// Ways a client action can fail to take effect.
///
/// None of these are faults: the game loop logs them and moves on. Corrective
/// replies (such as `forcePosition`) are queued before the error is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArenaError {
    #[error("action rejected: {0}")]
    ValidationRejected(Rejection),
    #[error("rate limit exceeded for {0:?}")]
    RateLimitExceeded(ActionKind),
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("connection from {0} rejected: too many recent connections")]
    ConnectionRejected(IpAddr),
    #[error("session {0} is not active")]
    StaleSession(SessionId),
}

impl From<Rejection> for ArenaError {
    fn from(rejection: Rejection) -> Self {
        ArenaError::ValidationRejected(rejection)
    }
}
