//! Notification fan-out: maps player identities to connected clients

use crate::matchmaking::room::Room;
use crate::net::messages::{match_notification, status_notification, Response};
use crate::types::PlayerId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Unique identifier for a client connection
pub type ConnectionId = u64;

struct RegistryInner {
    /// Writer handle per connection; each connection drains its own queue
    clients: HashMap<ConnectionId, UnboundedSender<String>>,
    /// Player associated with a connection (set by `create_player`)
    players: HashMap<ConnectionId, PlayerId>,
}

/// Connected-client registry used for server pushes.
///
/// Sends are non-blocking: each connection owns an unbounded channel that
/// its writer task drains, so the engine's callbacks never wait on socket
/// I/O.
pub struct ClientRegistry {
    inner: Mutex<RegistryInner>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                clients: HashMap::new(),
                players: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, conn_id: ConnectionId, sender: UnboundedSender<String>) {
        self.lock().clients.insert(conn_id, sender);
    }

    /// Drop a connection, returning the player that was bound to it
    pub fn unregister(&self, conn_id: ConnectionId) -> Option<PlayerId> {
        let mut inner = self.lock();
        inner.clients.remove(&conn_id);
        inner.players.remove(&conn_id)
    }

    /// Associate a connection with a player; the last created player wins
    pub fn bind_player(&self, conn_id: ConnectionId, player_id: PlayerId) {
        self.lock().players.insert(conn_id, player_id);
    }

    pub fn player_for(&self, conn_id: ConnectionId) -> Option<PlayerId> {
        self.lock().players.get(&conn_id).copied()
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    /// Queue a message for every connection bound to the given player
    pub fn send_to_player(&self, player_id: PlayerId, response: &Response) {
        let line = match serde_json::to_string(response) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize notification: {}", e);
                return;
            }
        };

        let inner = self.lock();
        for (conn_id, bound_player) in inner.players.iter() {
            if *bound_player != player_id {
                continue;
            }
            if let Some(sender) = inner.clients.get(conn_id) {
                if sender.send(line.clone()).is_err() {
                    debug!("Client {} is gone, dropping notification", conn_id);
                }
            }
        }
    }

    /// Push `match_notify` to each member of a new room
    pub fn notify_match(&self, room: &Room) {
        let push = match_notification(room);
        for player in room.players() {
            self.send_to_player(player.id(), &push);
        }
        debug!(
            "Dispatched match_notify for room {} to {} players",
            room.id(),
            room.player_count()
        );
    }

    /// Push `status_changed` to the affected player's clients
    pub fn notify_status(&self, player_id: PlayerId, in_queue: bool) {
        let push = status_notification(player_id, in_queue);
        self.send_to_player(player_id, &push);
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Player;
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_status_goes_only_to_bound_connection() {
        let registry = ClientRegistry::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        registry.register(1, tx1);
        registry.register(2, tx2);
        registry.bind_player(1, 10);
        registry.bind_player(2, 20);

        registry.notify_status(10, true);

        let line = rx1.try_recv().unwrap();
        assert!(line.contains("status_changed"));
        assert!(line.contains("in_queue"));
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_match_notify_reaches_all_members() {
        let registry = ClientRegistry::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        registry.register(1, tx1);
        registry.register(2, tx2);
        registry.bind_player(1, 10);
        registry.bind_player(2, 20);

        let room = Room::new(1, 2);
        room.add_player(&Arc::new(Player::new(10, "a", 1500)));
        room.add_player(&Arc::new(Player::new(20, "b", 1600)));

        registry.notify_match(&room);

        assert!(rx1.try_recv().unwrap().contains("match_notify"));
        assert!(rx2.try_recv().unwrap().contains("match_notify"));
    }

    #[test]
    fn test_unregister_returns_bound_player() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = unbounded_channel();
        registry.register(7, tx);
        registry.bind_player(7, 99);

        assert_eq!(registry.unregister(7), Some(99));
        assert_eq!(registry.unregister(7), None);
        assert_eq!(registry.client_count(), 0);
    }
}
