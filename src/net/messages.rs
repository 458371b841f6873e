//! Wire messages for the line-oriented JSON protocol
//!
//! Every request and response is a single JSON envelope per line. Server
//! pushes (`match_notify`, `status_changed`) reuse the response shape.

use crate::matchmaking::room::Room;
use crate::types::{PlayerId, RoomId, RoomStatus, DEFAULT_RATING};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client request envelope: `{"cmd": ..., "data": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub cmd: String,
    #[serde(default)]
    pub data: Value,
}

/// Response / notification envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub cmd: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(cmd: &str, message: &str, data: Value) -> Self {
        Self {
            cmd: cmd.to_string(),
            success: true,
            message: message.to_string(),
            data: Some(data),
        }
    }

    pub fn failure(cmd: &str, message: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            success: false,
            message: message.to_string(),
            data: None,
        }
    }

    /// Unparseable envelope; the command is unknown so it is echoed as
    /// `"error"`.
    pub fn protocol_error(message: &str) -> Self {
        Self::failure("error", message)
    }
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_player_rating() -> i32 {
    DEFAULT_RATING
}

/// `create_player` request payload
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlayerData {
    #[serde(default = "default_player_name")]
    pub name: String,
    #[serde(default = "default_player_rating")]
    pub rating: i32,
}

/// Payload for requests keyed by a player id
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerIdData {
    pub player_id: PlayerId,
}

/// `create_player` response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCreatedData {
    pub player_id: PlayerId,
    pub name: String,
    pub rating: i32,
}

/// One entry of the `get_rooms` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub player_count: usize,
    pub capacity: usize,
    pub avg_rating: f64,
}

impl RoomSummary {
    pub fn from_room(room: &Room) -> Self {
        Self {
            room_id: room.id(),
            status: room.status(),
            player_count: room.player_count(),
            capacity: room.capacity(),
            avg_rating: room.average_rating(),
        }
    }
}

/// `get_queue_status` response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusData {
    pub queue_size: usize,
}

/// One room member in a `match_notify` push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub rating: i32,
}

/// `match_notify` push payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchNotifyData {
    pub room_id: RoomId,
    pub players: Vec<MatchedPlayer>,
}

/// `status_changed` push payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub player_id: PlayerId,
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    InQueue,
    LeftQueue,
}

/// Build the `match_notify` push for a freshly created room
pub fn match_notification(room: &Room) -> Response {
    let players = room
        .players()
        .iter()
        .map(|p| MatchedPlayer {
            player_id: p.id(),
            name: p.name().to_string(),
            rating: p.rating(),
        })
        .collect();
    let data = MatchNotifyData {
        room_id: room.id(),
        players,
    };
    Response::ok(
        "match_notify",
        "Match found",
        serde_json::to_value(data).unwrap_or(Value::Null),
    )
}

/// Build the `status_changed` push for a queue membership change
pub fn status_notification(player_id: PlayerId, in_queue: bool) -> Response {
    let data = StatusChangedData {
        player_id,
        status: if in_queue {
            QueueStatus::InQueue
        } else {
            QueueStatus::LeftQueue
        },
    };
    Response::ok(
        "status_changed",
        "Player status changed",
        serde_json::to_value(data).unwrap_or(Value::Null),
    )
}
