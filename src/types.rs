//! Common types used throughout the matchmaking service

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

/// Unique identifier for players, assigned by the manager
pub type PlayerId = u64;

/// Unique identifier for rooms, assigned by the matchmaker
pub type RoomId = u64;

/// Rating assigned to players created without an explicit rating
pub const DEFAULT_RATING: i32 = 1500;

/// A registered player.
///
/// Player records are shared by reference between the manager's registry,
/// the match queue, and rooms, so the mutable fields are atomics: the id
/// and name never change after creation, while rating, queue membership and
/// the activity timestamp may be updated from any worker thread.
#[derive(Debug)]
pub struct Player {
    id: PlayerId,
    name: String,
    rating: AtomicI32,
    in_queue: AtomicBool,
    last_activity_ms: AtomicU64,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, rating: i32) -> Self {
        Self {
            id,
            name: name.into(),
            rating: AtomicI32::new(rating),
            in_queue: AtomicBool::new(false),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rating(&self) -> i32 {
        self.rating.load(Ordering::SeqCst)
    }

    pub fn set_rating(&self, rating: i32) {
        self.rating.store(rating, Ordering::SeqCst);
    }

    pub fn in_queue(&self) -> bool {
        self.in_queue.load(Ordering::SeqCst)
    }

    pub fn set_in_queue(&self, in_queue: bool) {
        self.in_queue.store(in_queue, Ordering::SeqCst);
    }

    /// Atomically flip the queue flag; `true` only for the caller that wins
    /// the transition, so concurrent join/leave pairs serialize cleanly.
    pub fn transition_queue_flag(&self, from: bool, to: bool) -> bool {
        self.in_queue
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::SeqCst)
    }

    /// Refresh the activity timestamp. Any manager-level operation counts
    /// as activity, which is also what the queue's wait clock reads.
    pub fn touch(&self, now_ms: u64) {
        self.last_activity_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Point-in-time snapshot for the wire
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            player_id: self.id,
            name: self.name.clone(),
            rating: self.rating(),
            in_queue: self.in_queue(),
        }
    }
}

/// Serializable snapshot of a player record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub name: String,
    pub rating: i32,
    pub in_queue: bool,
}

/// Lifecycle status of a room.
///
/// `Started` and `Finished` belong to an external game-session layer; the
/// matchmaking core only ever produces `Waiting` and `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Ready,
    Started,
    Finished,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Waiting => write!(f, "WAITING"),
            RoomStatus::Ready => write!(f, "READY"),
            RoomStatus::Started => write!(f, "STARTED"),
            RoomStatus::Finished => write!(f, "FINISHED"),
        }
    }
}
