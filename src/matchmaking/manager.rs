//! Process-wide matchmaking façade
//!
//! The manager owns the player registry and the id allocator, delegates
//! queue membership to the matchmaker, and holds the two user callback
//! slots. It is a long-lived value constructed at startup and handed to the
//! transport, so tests instantiate a fresh engine per case.

use crate::error::Result;
use crate::matchmaking::matchmaker::Matchmaker;
use crate::matchmaking::room::Room;
use crate::matchmaking::strategy::RatingBasedStrategy;
use crate::types::{Player, PlayerId, RoomId};
use crate::utils::now_millis;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Notified whenever a player joins or leaves the queue. Errors are logged
/// and swallowed; the callback is not unregistered.
pub type PlayerStatusCallback = Arc<dyn Fn(PlayerId, bool) -> Result<()> + Send + Sync>;

pub struct MatchManager {
    players: Mutex<HashMap<PlayerId, Arc<Player>>>,
    next_player_id: AtomicU64,
    matchmaker: Arc<Matchmaker>,
    player_status: Mutex<Option<PlayerStatusCallback>>,
    // Kept for the status dump; the live threshold lives in the strategy.
    max_rating_diff: AtomicI32,
    initialized: AtomicBool,
}

impl MatchManager {
    /// Build a manager with a fresh matchmaker and the default
    /// rating-based strategy. The matching loop is not started until
    /// [`MatchManager::init`].
    pub fn new(players_per_room: usize) -> Arc<Self> {
        let matchmaker = Arc::new(Matchmaker::new(players_per_room));
        matchmaker.set_strategy(Arc::new(RatingBasedStrategy::default()));

        Arc::new(Self {
            players: Mutex::new(HashMap::new()),
            next_player_id: AtomicU64::new(1),
            matchmaker,
            player_status: Mutex::new(None),
            max_rating_diff: AtomicI32::new(RatingBasedStrategy::default().max_diff()),
            initialized: AtomicBool::new(false),
        })
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the matching loop; idempotent.
    pub fn init(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.matchmaker.start();
        info!(
            "Match manager initialized (players_per_room: {})",
            self.matchmaker.players_per_room()
        );
    }

    /// Stop the matching loop and clear the player registry; idempotent.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.matchmaker.stop();
        Self::lock(&self.players).clear();
        info!("Match manager shut down");
    }

    pub fn create_player(&self, name: &str, rating: i32) -> Arc<Player> {
        let player_id = self.next_player_id.fetch_add(1, Ordering::SeqCst);
        let player = Arc::new(Player::new(player_id, name, rating));
        player.touch(now_millis());

        Self::lock(&self.players).insert(player_id, Arc::clone(&player));
        info!(
            "Created player {} ('{}', rating {})",
            player_id, name, rating
        );
        player
    }

    pub fn get_player(&self, player_id: PlayerId) -> Option<Arc<Player>> {
        Self::lock(&self.players).get(&player_id).cloned()
    }

    /// Remove a player record, pulling it out of the queue first when
    /// needed. No-op for an unknown id.
    ///
    /// The players lock is released before the matchmaker call and the
    /// status callback; holding it across either would invert the lock
    /// order used by the matching loop.
    pub fn remove_player(&self, player_id: PlayerId) {
        let removed = {
            let mut players = Self::lock(&self.players);
            players.remove(&player_id)
        };
        let Some(player) = removed else {
            return;
        };

        if player.in_queue() {
            self.matchmaker.remove(player_id);
            player.set_in_queue(false);
            self.fire_player_status(player_id, false);
        }
        info!("Removed player {}", player_id);
    }

    /// Enter the global queue. Returns `false` for an unknown player or
    /// one that is already queued.
    ///
    /// The queue flag is set before the queue add becomes observable to
    /// the matching loop, so a concurrent leave cannot race past it; on
    /// add failure the flag is rolled back.
    pub fn join_matchmaking(&self, player_id: PlayerId) -> bool {
        let Some(player) = self.get_player(player_id) else {
            return false;
        };
        if !player.transition_queue_flag(false, true) {
            debug!("Player {} is already in the queue", player_id);
            return false;
        }

        player.touch(now_millis());
        if let Err(e) = self.matchmaker.add(Arc::clone(&player)) {
            player.set_in_queue(false);
            warn!("Failed to queue player {}: {}", player_id, e);
            return false;
        }

        self.fire_player_status(player_id, true);
        true
    }

    /// Leave the global queue. Returns `false` for an unknown player or
    /// one that is not queued (including one just committed to a room).
    pub fn leave_matchmaking(&self, player_id: PlayerId) -> bool {
        let Some(player) = self.get_player(player_id) else {
            return false;
        };
        if !player.transition_queue_flag(true, false) {
            debug!("Player {} is not in the queue", player_id);
            return false;
        }

        player.touch(now_millis());
        self.matchmaker.remove(player_id);
        self.fire_player_status(player_id, false);
        true
    }

    pub fn room(&self, room_id: RoomId) -> Option<Arc<Room>> {
        self.matchmaker.room(room_id)
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.matchmaker.rooms()
    }

    pub fn set_match_notify_callback<F>(&self, callback: F)
    where
        F: Fn(&Arc<Room>) -> Result<()> + Send + Sync + 'static,
    {
        self.matchmaker.set_match_notify_callback(callback);
    }

    pub fn set_player_status_callback<F>(&self, callback: F)
    where
        F: Fn(PlayerId, bool) -> Result<()> + Send + Sync + 'static,
    {
        *Self::lock(&self.player_status) = Some(Arc::new(callback));
    }

    /// Replace the default strategy with a fresh rating-based one
    pub fn set_max_rating_difference(&self, max_diff: i32) {
        self.max_rating_diff.store(max_diff, Ordering::SeqCst);
        self.matchmaker
            .set_strategy(Arc::new(RatingBasedStrategy::new(max_diff)));
        info!("Max rating difference set to {}", max_diff);
    }

    pub fn set_force_match_on_timeout(&self, enabled: bool) {
        self.matchmaker.set_force_match_on_timeout(enabled);
    }

    pub fn set_match_timeout_ms(&self, timeout_ms: u64) {
        self.matchmaker.set_match_timeout_ms(timeout_ms);
    }

    pub fn queue_size(&self) -> usize {
        self.matchmaker.queue_size()
    }

    pub fn player_count(&self) -> usize {
        Self::lock(&self.players).len()
    }

    pub fn room_count(&self) -> usize {
        self.matchmaker.room_count()
    }

    pub fn matchmaker(&self) -> &Arc<Matchmaker> {
        &self.matchmaker
    }

    /// Diagnostic dump: queued players sorted by rating, active rooms and
    /// the effective configuration.
    pub fn print_matchmaking_status(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let mut queued = self.matchmaker.queue_snapshot();
        queued.sort_by_key(|p| p.rating());

        writeln!(out, "=== Matchmaking status ===")?;
        writeln!(out, "Queued players: {}", queued.len())?;
        for player in &queued {
            writeln!(
                out,
                "  #{} '{}' rating {}",
                player.id(),
                player.name(),
                player.rating()
            )?;
        }

        let rooms = self.matchmaker.rooms();
        writeln!(out, "Rooms: {}", rooms.len())?;
        for room in &rooms {
            writeln!(
                out,
                "  room {} [{}] {}/{} avg rating {:.1}",
                room.id(),
                room.status(),
                room.player_count(),
                room.capacity(),
                room.average_rating()
            )?;
        }

        let stats = self.matchmaker.stats();
        writeln!(
            out,
            "Config: players_per_room={} max_rating_diff={} strategy={} force_match_on_timeout={} match_timeout_ms={}",
            self.matchmaker.players_per_room(),
            self.max_rating_diff.load(Ordering::SeqCst),
            self.matchmaker.strategy().describe(),
            self.matchmaker.force_match_on_timeout(),
            self.matchmaker.match_timeout_ms()
        )?;
        writeln!(
            out,
            "Stats: rooms_created={} matches_forced={}",
            stats.rooms_created, stats.matches_forced
        )?;
        Ok(())
    }

    fn fire_player_status(&self, player_id: PlayerId, in_queue: bool) {
        // Clone the callback out so it runs without any internal lock held.
        let callback = Self::lock(&self.player_status).clone();
        if let Some(callback) = callback {
            if let Err(e) = callback(player_id, in_queue) {
                warn!(
                    "Player status callback failed for player {}: {}",
                    player_id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn fresh_manager(players_per_room: usize) -> Arc<MatchManager> {
        MatchManager::new(players_per_room)
    }

    #[test]
    fn test_create_player_assigns_monotonic_ids() {
        let manager = fresh_manager(2);

        let a = manager.create_player("a", 1500);
        let b = manager.create_player("b", 1500);
        manager.remove_player(a.id());
        let c = manager.create_player("c", 1500);

        assert!(b.id() > a.id());
        assert!(c.id() > b.id());
        assert_eq!(manager.player_count(), 2);
    }

    #[test]
    fn test_join_and_leave() {
        let manager = fresh_manager(4);
        let p = manager.create_player("p", 1500);

        assert!(manager.join_matchmaking(p.id()));
        assert!(p.in_queue());
        assert_eq!(manager.queue_size(), 1);

        // Joining twice fails and does not duplicate the entry.
        assert!(!manager.join_matchmaking(p.id()));
        assert_eq!(manager.queue_size(), 1);

        assert!(manager.leave_matchmaking(p.id()));
        assert!(!p.in_queue());
        assert_eq!(manager.queue_size(), 0);

        // Leaving when not queued fails.
        assert!(!manager.leave_matchmaking(p.id()));
    }

    #[test]
    fn test_join_unknown_player() {
        let manager = fresh_manager(2);
        assert!(!manager.join_matchmaking(42));
        assert!(!manager.leave_matchmaking(42));
    }

    #[test]
    fn test_remove_player_clears_queue_entry() {
        let manager = fresh_manager(4);
        let p = manager.create_player("p", 1500);
        manager.join_matchmaking(p.id());

        manager.remove_player(p.id());
        assert_eq!(manager.queue_size(), 0);
        assert!(!p.in_queue());
        assert!(manager.get_player(p.id()).is_none());

        // Idempotent on a missing id.
        manager.remove_player(p.id());
    }

    #[test]
    fn test_status_callback_sequence() {
        let manager = fresh_manager(4);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.set_player_status_callback(move |player_id, in_queue| {
            sink.lock().unwrap().push((player_id, in_queue));
            Ok(())
        });

        let p1 = manager.create_player("p1", 1500);
        let p2 = manager.create_player("p2", 1500);
        manager.join_matchmaking(p1.id());
        manager.leave_matchmaking(p1.id());
        manager.join_matchmaking(p2.id());

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![(p1.id(), true), (p1.id(), false), (p2.id(), true)]
        );
    }

    #[test]
    fn test_end_to_end_match_through_loop() {
        let manager = fresh_manager(2);
        manager.init();

        let notified = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&notified);
        manager.set_match_notify_callback(move |_room| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let p1 = manager.create_player("p1", 1500);
        let p2 = manager.create_player("p2", 1600);
        manager.join_matchmaking(p1.id());
        manager.join_matchmaking(p2.id());

        std::thread::sleep(Duration::from_millis(400));

        assert_eq!(manager.queue_size(), 0);
        assert_eq!(manager.room_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(!p1.in_queue());
        assert!(!p2.in_queue());

        manager.shutdown();
        assert_eq!(manager.player_count(), 0);
    }

    #[test]
    fn test_rating_gate_holds_until_compatible_player() {
        let manager = fresh_manager(2);
        manager.set_force_match_on_timeout(false);
        manager.init();

        let p1 = manager.create_player("p1", 1500);
        let p2 = manager.create_player("p2", 2000);
        manager.join_matchmaking(p1.id());
        manager.join_matchmaking(p2.id());

        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(manager.queue_size(), 2);
        assert_eq!(manager.room_count(), 0);

        let p3 = manager.create_player("p3", 1600);
        manager.join_matchmaking(p3.id());

        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(manager.queue_size(), 1);
        assert_eq!(manager.room_count(), 1);

        let room = manager.rooms().pop().unwrap();
        assert!(room.contains(p1.id()));
        assert!(room.contains(p3.id()));
        assert!(!room.contains(p2.id()));

        manager.shutdown();
    }

    #[test]
    fn test_init_and_shutdown_are_idempotent() {
        let manager = fresh_manager(2);
        manager.init();
        manager.init();
        manager.shutdown();
        manager.shutdown();
    }

    #[test]
    fn test_status_dump_contains_queue_and_config() {
        let manager = fresh_manager(2);
        let p = manager.create_player("dumped", 1234);
        manager.join_matchmaking(p.id());

        let mut out = Vec::new();
        manager.print_matchmaking_status(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("dumped"));
        assert!(text.contains("1234"));
        assert!(text.contains("players_per_room=2"));
        assert!(text.contains("rating-based (max diff 300)"));
    }
}
