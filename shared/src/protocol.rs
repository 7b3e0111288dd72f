use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::WorldInfo;
use crate::vec2::Vec2;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Session ids double as player ids once a session has joined.
pub type SessionId = u32;
pub type FoodId = u64;

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    Snapshot(SnapshotMsg),
    PlayerJoined(PlayerWire),
    PlayerMoved(PlayerWire),
    ForcePosition(ForcePositionMsg),
    FoodDelta(FoodDeltaMsg),
    PlayerSize(PlayerSizeMsg),
    PlayerEliminated(PlayerEliminatedMsg),
    PlayerLeft(PlayerLeftMsg),
    PlayerCount(PlayerCountMsg),
    SyncPlayers(PlayersMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMsg {
    pub protocol_version: u32,
    pub self_id: SessionId,
    pub players: Vec<PlayerWire>,
    pub food: Vec<FoodWire>,
    pub world: WorldInfo,
}

/// Public fields of a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWire {
    pub id: SessionId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    #[ts(type = "number")]
    pub score: u64,
    pub color: String,
    #[serde(default)]
    pub segments: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FoodWire {
    #[ts(type = "number")]
    pub id: FoodId,
    pub x: f64,
    pub y: f64,
    pub value: u32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ForcePositionMsg {
    pub x: f64,
    pub y: f64,
}

/// Incremental food change. Never a full resend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FoodDeltaMsg {
    #[ts(type = "Array<number>")]
    pub removed: Vec<FoodId>,
    pub added: Vec<FoodWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerSizeMsg {
    pub id: SessionId,
    pub size: f64,
    #[ts(type = "number")]
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEliminatedMsg {
    pub eliminated_id: SessionId,
    pub eliminator_id: SessionId,
    pub eliminator_size: f64,
    #[ts(type = "number")]
    pub eliminator_score: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerLeftMsg {
    pub id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerCountMsg {
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayersMsg {
    pub players: Vec<PlayerWire>,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    Join {
        #[serde(default)]
        name: String,
        color: Option<String>,
    },
    Move {
        x: f64,
        y: f64,
        /// Client-side size estimate. Ignored; the server's size is authoritative.
        size: Option<f64>,
        segments: Option<Vec<Vec2>>,
    },
    Consume {
        #[serde(rename = "foodId")]
        #[ts(type = "number")]
        food_id: FoodId,
    },
    /// Advisory only: re-validated against server-side positions and sizes.
    Eliminate {
        #[serde(rename = "targetId")]
        target_id: SessionId,
    },
    Heartbeat,
}
