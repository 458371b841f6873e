//! Request codec: maps textual commands onto engine calls

use crate::matchmaking::manager::MatchManager;
use crate::net::messages::{
    CreatePlayerData, PlayerCreatedData, PlayerIdData, QueueStatusData, Request, Response,
    RoomSummary,
};
use crate::net::notifier::{ClientRegistry, ConnectionId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Dispatches one request line to the engine and renders the response.
///
/// All failures are answered in-band (`success = false`); nothing here can
/// take the connection down.
pub struct RequestHandler {
    manager: Arc<MatchManager>,
    registry: Arc<ClientRegistry>,
}

impl RequestHandler {
    pub fn new(manager: Arc<MatchManager>, registry: Arc<ClientRegistry>) -> Self {
        Self { manager, registry }
    }

    pub fn handle(&self, line: &str, conn_id: ConnectionId) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(_) => return Response::protocol_error("Invalid JSON format"),
        };

        debug!(
            "Received command '{}' from client {}",
            request.cmd, conn_id
        );

        match request.cmd.as_str() {
            "create_player" => self.create_player(request.data, conn_id),
            "join_matchmaking" => self.join_matchmaking(request.data),
            "leave_matchmaking" => self.leave_matchmaking(request.data),
            "get_rooms" => self.get_rooms(),
            "get_player_info" => self.get_player_info(request.data),
            "get_queue_status" => self.get_queue_status(),
            other => Response::failure(other, "Unknown command"),
        }
    }

    fn create_player(&self, data: Value, conn_id: ConnectionId) -> Response {
        let data: CreatePlayerData = match parse_data(data) {
            Ok(data) => data,
            Err(message) => return Response::failure("create_player", &message),
        };

        let player = self.manager.create_player(&data.name, data.rating);
        // Disconnect cleanup removes whichever player this connection
        // created last.
        self.registry.bind_player(conn_id, player.id());

        let payload = PlayerCreatedData {
            player_id: player.id(),
            name: player.name().to_string(),
            rating: player.rating(),
        };
        Response::ok(
            "create_player",
            "Player created successfully",
            serde_json::to_value(payload).unwrap_or(Value::Null),
        )
    }

    fn join_matchmaking(&self, data: Value) -> Response {
        let data: PlayerIdData = match parse_data(data) {
            Ok(data) => data,
            Err(message) => return Response::failure("join_matchmaking", &message),
        };

        if self.manager.join_matchmaking(data.player_id) {
            Response::ok("join_matchmaking", "Joined matchmaking queue", Value::Object(Default::default()))
        } else {
            Response::failure("join_matchmaking", "Failed to join matchmaking queue")
        }
    }

    fn leave_matchmaking(&self, data: Value) -> Response {
        let data: PlayerIdData = match parse_data(data) {
            Ok(data) => data,
            Err(message) => return Response::failure("leave_matchmaking", &message),
        };

        if self.manager.leave_matchmaking(data.player_id) {
            Response::ok("leave_matchmaking", "Left matchmaking queue", Value::Object(Default::default()))
        } else {
            Response::failure("leave_matchmaking", "Failed to leave matchmaking queue")
        }
    }

    fn get_rooms(&self) -> Response {
        let summaries: Vec<RoomSummary> = self
            .manager
            .rooms()
            .iter()
            .map(|room| RoomSummary::from_room(room))
            .collect();
        Response::ok(
            "get_rooms",
            "Rooms retrieved successfully",
            serde_json::to_value(summaries).unwrap_or(Value::Null),
        )
    }

    fn get_player_info(&self, data: Value) -> Response {
        let data: PlayerIdData = match parse_data(data) {
            Ok(data) => data,
            Err(message) => return Response::failure("get_player_info", &message),
        };

        match self.manager.get_player(data.player_id) {
            Some(player) => Response::ok(
                "get_player_info",
                "Player info retrieved successfully",
                serde_json::to_value(player.info()).unwrap_or(Value::Null),
            ),
            None => Response::failure("get_player_info", "Player not found"),
        }
    }

    fn get_queue_status(&self) -> Response {
        let payload = QueueStatusData {
            queue_size: self.manager.queue_size(),
        };
        Response::ok(
            "get_queue_status",
            "Queue status retrieved successfully",
            serde_json::to_value(payload).unwrap_or(Value::Null),
        )
    }
}

/// Decode a command payload; a missing `data` field acts as `{}` so
/// payloads that are all-defaults stay optional.
fn parse_data<T: DeserializeOwned>(data: Value) -> Result<T, String> {
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| format!("Invalid request data: {}", e))
}
