//! Audience-tagged outbound messages.
//!
//! The game loop publishes every outbound item on a single broadcast channel;
//! each session task keeps only the items whose audience includes it.

use std::sync::Arc;

use arena_shared::protocol::{ServerMsg, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    AllExcept(SessionId),
    Only(SessionId),
}

impl Audience {
    pub fn includes(&self, session: SessionId) -> bool {
        match *self {
            Audience::All => true,
            Audience::AllExcept(id) => id != session,
            Audience::Only(id) => id == session,
        }
    }
}

/// Broadcasts from game loop to all session tasks
#[derive(Debug, Clone)]
pub enum GameBroadcast {
    Message {
        to: Audience,
        msg: Arc<ServerMsg>,
    },
    /// Server-initiated close of a session's transport
    Close { session_id: SessionId },
}

/// Collects the outbound side effects of one pipeline run, in order.
#[derive(Debug, Default)]
pub struct Dispatch {
    items: Vec<GameBroadcast>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: Audience, msg: ServerMsg) {
        self.items.push(GameBroadcast::Message {
            to,
            msg: Arc::new(msg),
        });
    }

    pub fn to_all(&mut self, msg: ServerMsg) {
        self.send(Audience::All, msg);
    }

    pub fn to_others(&mut self, except: SessionId, msg: ServerMsg) {
        self.send(Audience::AllExcept(except), msg);
    }

    pub fn to_one(&mut self, session: SessionId, msg: ServerMsg) {
        self.send(Audience::Only(session), msg);
    }

    pub fn close(&mut self, session_id: SessionId) {
        self.items.push(GameBroadcast::Close { session_id });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<GameBroadcast> {
        self.items
    }

    /// Messages visible to one session, in publish order.
    pub fn messages_for(&self, session: SessionId) -> Vec<&ServerMsg> {
        self.items
            .iter()
            .filter_map(|item| match item {
                GameBroadcast::Message { to, msg } if to.includes(session) => Some(msg.as_ref()),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self, session: SessionId) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, GameBroadcast::Close { session_id } if *session_id == session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::protocol::{PlayerCountMsg, PlayerLeftMsg};

    #[test]
    fn audience_filtering() {
        assert!(Audience::All.includes(3));
        assert!(Audience::AllExcept(2).includes(3));
        assert!(!Audience::AllExcept(3).includes(3));
        assert!(Audience::Only(3).includes(3));
        assert!(!Audience::Only(3).includes(4));
    }

    #[test]
    fn messages_for_keeps_order_and_audience() {
        let mut out = Dispatch::new();
        out.to_one(1, ServerMsg::PlayerCount(PlayerCountMsg { count: 2 }));
        out.to_others(1, ServerMsg::PlayerLeft(PlayerLeftMsg { id: 9 }));
        out.to_all(ServerMsg::PlayerLeft(PlayerLeftMsg { id: 8 }));
        out.close(2);

        let for_one = out.messages_for(1);
        assert_eq!(for_one.len(), 2);
        assert!(matches!(for_one[0], ServerMsg::PlayerCount(_)));
        assert!(matches!(for_one[1], ServerMsg::PlayerLeft(PlayerLeftMsg { id: 8 })));

        assert_eq!(out.messages_for(2).len(), 2);
        assert!(out.closes(2));
        assert!(!out.closes(1));
    }
}
