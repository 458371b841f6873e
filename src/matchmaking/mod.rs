//! Matchmaking engine: queue, strategy, rooms, matching loop and façade

pub mod manager;
pub mod matchmaker;
pub mod queue;
pub mod room;
pub mod strategy;

// Re-export commonly used types
pub use manager::{MatchManager, PlayerStatusCallback};
pub use matchmaker::{Matchmaker, MatchNotifyCallback};
pub use queue::{MatchGroup, MatchQueue};
pub use room::Room;
pub use strategy::{MatchStrategy, RatingBasedStrategy};
