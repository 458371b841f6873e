//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error
//! handling throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: u64 },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: u64 },

    #[error("Player {player_id} is already in the matchmaking queue")]
    AlreadyInQueue { player_id: u64 },

    #[error("Player {player_id} is not in the matchmaking queue")]
    NotInQueue { player_id: u64 },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
