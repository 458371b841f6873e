//! The global match queue and its one-shot group selection

use crate::error::{MatchmakingError, Result};
use crate::matchmaking::strategy::{MatchStrategy, RatingBasedStrategy};
use crate::types::{Player, PlayerId};
use crate::utils::now_millis;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

struct QueueInner {
    entries: VecDeque<Arc<Player>>,
    strategy: Arc<dyn MatchStrategy>,
}

/// A group selected from the queue.
///
/// `forced` marks groups produced by the greedy time-fairness fallback,
/// which ignores the strategy once the head waiter has aged past the
/// configured threshold.
#[derive(Clone)]
pub struct MatchGroup {
    pub players: Vec<Arc<Player>>,
    pub forced: bool,
}

/// Ordered container of waiting players (insertion order, FIFO).
///
/// A single mutex guards both the entries and the strategy pointer, so a
/// strategy swap is atomic from the matching loop's perspective and
/// `try_select` holds the lock for the entire scan-and-commit.
///
/// The queue never sets `in_queue` on add or remove (the manager owns that
/// transition); it only clears the flag for members of a committed group
/// and for entries dropped by `clear`, both under the queue lock.
pub struct MatchQueue {
    inner: Mutex<QueueInner>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::with_strategy(Arc::new(RatingBasedStrategy::default()))
    }

    pub fn with_strategy(strategy: Arc<dyn MatchStrategy>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::new(),
                strategy,
            }),
        }
    }

    // No user code runs under the queue lock; a poisoned guard still holds
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a player to the tail. The caller must have set `in_queue`
    /// beforehand and is responsible for rolling it back on error.
    pub fn add(&self, player: Arc<Player>) -> Result<()> {
        let mut inner = self.lock();
        if inner.entries.iter().any(|p| p.id() == player.id()) {
            return Err(MatchmakingError::AlreadyInQueue {
                player_id: player.id(),
            }
            .into());
        }
        debug!("Queued player {} (rating {})", player.id(), player.rating());
        inner.entries.push_back(player);
        Ok(())
    }

    /// Remove the entry with the given id; no-op when absent.
    pub fn remove(&self, player_id: PlayerId) {
        let mut inner = self.lock();
        if let Some(pos) = inner.entries.iter().position(|p| p.id() == player_id) {
            inner.entries.remove(pos);
            debug!("Removed player {} from queue", player_id);
        }
    }

    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    /// Drop all entries, clearing their queue flags.
    pub fn clear(&self) {
        let mut inner = self.lock();
        for player in inner.entries.iter() {
            player.set_in_queue(false);
        }
        inner.entries.clear();
    }

    pub fn set_strategy(&self, strategy: Arc<dyn MatchStrategy>) {
        self.lock().strategy = strategy;
    }

    pub fn strategy(&self) -> Arc<dyn MatchStrategy> {
        Arc::clone(&self.lock().strategy)
    }

    /// Ordered copy of the waiting players, for diagnostics
    pub fn snapshot(&self) -> Vec<Arc<Player>> {
        self.lock().entries.iter().cloned().collect()
    }

    /// One-shot selection of a compatible group of `required` players.
    ///
    /// The candidate group is anchored at the head of the queue (the oldest
    /// waiter); the rest of the queue is scanned in order and a player joins
    /// the group only if compatible with every member already selected. If
    /// no full group forms and `force_on_timeout` is set, a head waiter
    /// older than `timeout_ms` triggers the greedy fallback which takes the
    /// first `required` entries regardless of the strategy.
    ///
    /// On success the members are removed (preserving the order of the
    /// remainder) and their `in_queue` flags cleared before the lock drops.
    pub fn try_select(
        &self,
        required: usize,
        force_on_timeout: bool,
        timeout_ms: u64,
    ) -> Option<MatchGroup> {
        if required == 0 {
            return None;
        }

        let mut inner = self.lock();
        if inner.entries.len() < required {
            return None;
        }

        let QueueInner { entries, strategy } = &*inner;

        let mut group: Vec<Arc<Player>> = Vec::with_capacity(required);
        group.push(Arc::clone(&entries[0]));

        for candidate in entries.iter().skip(1) {
            if group.len() >= required {
                break;
            }
            if group
                .iter()
                .all(|member| strategy.is_match(member, candidate))
            {
                group.push(Arc::clone(candidate));
            }
        }

        let mut forced = false;
        if group.len() < required && force_on_timeout {
            let head_age = now_millis().saturating_sub(entries[0].last_activity_ms());
            if head_age > timeout_ms {
                info!(
                    "Force matching due to timeout: {}ms > {}ms",
                    head_age, timeout_ms
                );
                group = entries.iter().take(required).cloned().collect();
                forced = true;
            }
        }

        if group.len() < required {
            return None;
        }

        // Commit: pull the members out and clear their queue flags while
        // still holding the lock, so no concurrent leave can observe a
        // selected player as queued.
        inner
            .entries
            .retain(|p| !group.iter().any(|m| m.id() == p.id()));
        for player in &group {
            player.set_in_queue(false);
        }

        Some(MatchGroup {
            players: group,
            forced,
        })
    }
}

impl Default for MatchQueue {
    fn default() -> Self {
        Self::new()
    }
}
