//! Room records produced by the matchmaker

use crate::types::{Player, PlayerId, RoomId, RoomStatus};
use crate::utils::now_millis;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct RoomInner {
    players: HashMap<PlayerId, Arc<Player>>,
    status: RoomStatus,
}

/// A committed group of players plus metadata.
///
/// Rooms are created by the matchmaker once a group has been selected and
/// are retained in the room registry indefinitely. The optional rating band
/// (`0` = unbounded) is only enforced for directly synthesized rooms; the
/// default matchmaking path never sets one.
pub struct Room {
    id: RoomId,
    capacity: usize,
    min_rating: i32,
    max_rating: i32,
    created_at_ms: u64,
    inner: RwLock<RoomInner>,
}

impl Room {
    pub fn new(id: RoomId, capacity: usize) -> Self {
        Self::with_band(id, capacity, 0, 0)
    }

    pub fn with_band(id: RoomId, capacity: usize, min_rating: i32, max_rating: i32) -> Self {
        Self {
            id,
            capacity,
            min_rating,
            max_rating,
            created_at_ms: now_millis(),
            inner: RwLock::new(RoomInner {
                players: HashMap::new(),
                status: RoomStatus::Waiting,
            }),
        }
    }

    // No user code ever runs under the room lock, so a poisoned guard still
    // holds consistent data and we keep using it.
    fn read(&self) -> RwLockReadGuard<'_, RoomInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RoomInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_rating(&self) -> i32 {
        self.min_rating
    }

    pub fn max_rating(&self) -> i32 {
        self.max_rating
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn status(&self) -> RoomStatus {
        self.read().status
    }

    /// Status transitions past `Ready` belong to the game-session layer.
    pub fn set_status(&self, status: RoomStatus) {
        self.write().status = status;
    }

    pub fn player_count(&self) -> usize {
        self.read().players.len()
    }

    pub fn is_full(&self) -> bool {
        self.player_count() >= self.capacity
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.read().players.contains_key(&player_id)
    }

    /// Add a player; refused when the room is past `Waiting`, full, already
    /// holds the id, or the rating falls outside the band. Fills flip the
    /// status to `Ready`.
    pub fn add_player(&self, player: &Arc<Player>) -> bool {
        let mut inner = self.write();

        if inner.status != RoomStatus::Waiting || inner.players.len() >= self.capacity {
            return false;
        }
        if !self.rating_in_range(player.rating()) {
            return false;
        }
        if inner.players.contains_key(&player.id()) {
            return false;
        }

        inner.players.insert(player.id(), Arc::clone(player));
        if inner.players.len() >= self.capacity {
            inner.status = RoomStatus::Ready;
        }
        true
    }

    /// Remove a player; a `Ready` room drops back to `Waiting`.
    pub fn remove_player(&self, player_id: PlayerId) -> bool {
        let mut inner = self.write();
        if inner.players.remove(&player_id).is_some() {
            if inner.status == RoomStatus::Ready {
                inner.status = RoomStatus::Waiting;
            }
            true
        } else {
            false
        }
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.read().players.values().cloned().collect()
    }

    pub fn rating_in_range(&self, rating: i32) -> bool {
        if self.min_rating > 0 && rating < self.min_rating {
            return false;
        }
        if self.max_rating > 0 && rating > self.max_rating {
            return false;
        }
        true
    }

    pub fn average_rating(&self) -> f64 {
        let inner = self.read();
        if inner.players.is_empty() {
            return 0.0;
        }
        let sum: i64 = inner.players.values().map(|p| p.rating() as i64).sum();
        sum as f64 / inner.players.len() as f64
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("status", &self.status())
            .field("players", &self.player_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_RATING;

    fn player(id: u64, rating: i32) -> Arc<Player> {
        Arc::new(Player::new(id, format!("p{}", id), rating))
    }

    #[test]
    fn test_room_fills_to_ready() {
        let room = Room::new(1, 2);
        assert_eq!(room.status(), RoomStatus::Waiting);

        assert!(room.add_player(&player(1, 1500)));
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert!(!room.is_full());

        assert!(room.add_player(&player(2, 1600)));
        assert_eq!(room.status(), RoomStatus::Ready);
        assert!(room.is_full());

        // Full room rejects further players.
        assert!(!room.add_player(&player(3, 1550)));
    }

    #[test]
    fn test_duplicate_player_rejected() {
        let room = Room::new(1, 3);
        let p = player(1, DEFAULT_RATING);

        assert!(room.add_player(&p));
        assert!(!room.add_player(&p));
        assert_eq!(room.player_count(), 1);
    }

    #[test]
    fn test_remove_player_reopens_room() {
        let room = Room::new(1, 2);
        room.add_player(&player(1, 1500));
        room.add_player(&player(2, 1500));
        assert_eq!(room.status(), RoomStatus::Ready);

        assert!(room.remove_player(1));
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert!(!room.contains(1));

        // Removing an unknown id is a no-op.
        assert!(!room.remove_player(42));
    }

    #[test]
    fn test_rating_band() {
        let room = Room::with_band(1, 4, 1000, 2000);

        assert!(room.add_player(&player(1, 1000)));
        assert!(room.add_player(&player(2, 2000)));
        assert!(!room.add_player(&player(3, 999)));
        assert!(!room.add_player(&player(4, 2001)));
        assert_eq!(room.player_count(), 2);
    }

    #[test]
    fn test_zero_band_is_unbounded() {
        let room = Room::new(1, 2);
        assert!(room.rating_in_range(-50));
        assert!(room.rating_in_range(9000));
    }

    #[test]
    fn test_average_rating() {
        let room = Room::new(1, 3);
        assert_eq!(room.average_rating(), 0.0);

        room.add_player(&player(1, 1500));
        room.add_player(&player(2, 1600));
        assert_eq!(room.average_rating(), 1550.0);
    }
}
