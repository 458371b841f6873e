//! Compatibility strategies deciding which players may share a room

use crate::types::Player;

/// Default threshold for the rating-based strategy
pub const DEFAULT_MAX_RATING_DIFF: i32 = 300;

/// A pure predicate over pairs of players.
///
/// Implementations must be side-effect free and must not retain references
/// to the players they inspect; the queue evaluates the predicate against
/// the already-selected members of a candidate group.
pub trait MatchStrategy: Send + Sync {
    fn is_match(&self, a: &Player, b: &Player) -> bool;

    /// Short human-readable description for diagnostics
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Matches players whose ratings differ by at most a fixed threshold
#[derive(Debug, Clone)]
pub struct RatingBasedStrategy {
    max_diff: i32,
}

impl RatingBasedStrategy {
    pub fn new(max_diff: i32) -> Self {
        Self { max_diff }
    }

    pub fn max_diff(&self) -> i32 {
        self.max_diff
    }
}

impl Default for RatingBasedStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RATING_DIFF)
    }
}

impl MatchStrategy for RatingBasedStrategy {
    fn is_match(&self, a: &Player, b: &Player) -> bool {
        (a.rating() - b.rating()).abs() <= self.max_diff
    }

    fn describe(&self) -> String {
        format!("rating-based (max diff {})", self.max_diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u64, rating: i32) -> Player {
        Player::new(id, format!("p{}", id), rating)
    }

    #[test]
    fn test_default_threshold() {
        let strategy = RatingBasedStrategy::default();
        assert_eq!(strategy.max_diff(), 300);
    }

    #[test]
    fn test_rating_based_matching() {
        let strategy = RatingBasedStrategy::new(300);

        assert!(strategy.is_match(&player(1, 1500), &player(2, 1800)));
        assert!(strategy.is_match(&player(1, 1800), &player(2, 1500)));
        assert!(!strategy.is_match(&player(1, 1500), &player(2, 1801)));
        assert!(strategy.is_match(&player(1, 1500), &player(2, 1500)));
    }

    #[test]
    fn test_zero_threshold_requires_equal_ratings() {
        let strategy = RatingBasedStrategy::new(0);

        assert!(strategy.is_match(&player(1, 1500), &player(2, 1500)));
        assert!(!strategy.is_match(&player(1, 1500), &player(2, 1501)));
    }
}
