//! Utility functions for the matchmaking service

use chrono::{DateTime, Utc};

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as unsigned epoch milliseconds
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: i32, rating2: i32) -> i32 {
    (rating1 - rating2).abs()
}
