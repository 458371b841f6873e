//! The matchmaker: queue ownership, room registry and the matching loop

use crate::error::Result;
use crate::matchmaking::queue::{MatchGroup, MatchQueue};
use crate::matchmaking::room::Room;
use crate::matchmaking::strategy::MatchStrategy;
use crate::types::{Player, PlayerId, RoomId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Cadence of the matching loop. The fixed polling interval bounds both
/// worst-case match latency and wasted work.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Sink for successful matches. Errors are logged and swallowed; a failing
/// sink never kills the matching loop and is not unregistered.
pub type MatchNotifyCallback = Arc<dyn Fn(&Arc<Room>) -> Result<()> + Send + Sync>;

/// Counters maintained by the matching loop
#[derive(Debug, Clone, Default)]
pub struct MatchmakerStats {
    /// Total rooms created, including directly synthesized ones
    pub rooms_created: u64,
    /// Rooms produced by the greedy timeout fallback
    pub matches_forced: u64,
}

/// Owns the match queue, the room registry and the matching worker.
///
/// The worker is a dedicated thread started by `start()`; each iteration it
/// asks the queue for one head-anchored group, turns a successful selection
/// into a room, invokes the match-notify callback outside every lock, and
/// sleeps for [`TICK_INTERVAL`].
pub struct Matchmaker {
    queue: MatchQueue,
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
    next_room_id: AtomicU64,
    players_per_room: usize,
    force_match_on_timeout: AtomicBool,
    match_timeout_ms: AtomicU64,
    match_notify: Mutex<Option<MatchNotifyCallback>>,
    stats: Mutex<MatchmakerStats>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Matchmaker {
    pub fn new(players_per_room: usize) -> Self {
        Self {
            queue: MatchQueue::new(),
            rooms: Mutex::new(HashMap::new()),
            next_room_id: AtomicU64::new(1),
            players_per_room,
            force_match_on_timeout: AtomicBool::new(true),
            match_timeout_ms: AtomicU64::new(5000),
            match_notify: Mutex::new(None),
            stats: Mutex::new(MatchmakerStats::default()),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the matching worker; idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let matchmaker = Arc::clone(self);
        let handle = std::thread::spawn(move || matchmaker.match_loop());
        *Self::lock(&self.worker) = Some(handle);
        info!(
            "Matchmaker started (players_per_room: {}, tick: {:?})",
            self.players_per_room, TICK_INTERVAL
        );
    }

    /// Request termination, join the worker, then clear the queue;
    /// idempotent. Worst-case latency is one tick.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = Self::lock(&self.worker).take() {
            let _ = handle.join();
        }
        self.queue.clear();
        info!("Matchmaker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn players_per_room(&self) -> usize {
        self.players_per_room
    }

    pub fn add(&self, player: Arc<Player>) -> Result<()> {
        self.queue.add(player)
    }

    pub fn remove(&self, player_id: PlayerId) {
        self.queue.remove(player_id);
    }

    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    /// Ordered copy of the waiting players, for diagnostics
    pub fn queue_snapshot(&self) -> Vec<Arc<Player>> {
        self.queue.snapshot()
    }

    pub fn set_strategy(&self, strategy: Arc<dyn MatchStrategy>) {
        self.queue.set_strategy(strategy);
    }

    pub fn strategy(&self) -> Arc<dyn MatchStrategy> {
        self.queue.strategy()
    }

    pub fn set_force_match_on_timeout(&self, enabled: bool) {
        self.force_match_on_timeout
            .store(enabled, Ordering::SeqCst);
    }

    pub fn force_match_on_timeout(&self) -> bool {
        self.force_match_on_timeout.load(Ordering::SeqCst)
    }

    pub fn set_match_timeout_ms(&self, timeout_ms: u64) {
        self.match_timeout_ms.store(timeout_ms, Ordering::SeqCst);
    }

    pub fn match_timeout_ms(&self) -> u64 {
        self.match_timeout_ms.load(Ordering::SeqCst)
    }

    pub fn set_match_notify_callback<F>(&self, callback: F)
    where
        F: Fn(&Arc<Room>) -> Result<()> + Send + Sync + 'static,
    {
        *Self::lock(&self.match_notify) = Some(Arc::new(callback));
    }

    /// Create a room for the given players, register it and return it.
    ///
    /// Used by the matching loop and exposed for directly synthesized rooms
    /// (premade groups, tests). Never fails for a well-formed group; the
    /// default selection path imposes no rating band.
    pub fn create_room(&self, players: &[Arc<Player>]) -> Arc<Room> {
        let room_id = self.next_room_id.fetch_add(1, Ordering::SeqCst);
        let room = Arc::new(Room::new(room_id, players.len()));
        for player in players {
            room.add_player(player);
        }
        Self::lock(&self.rooms).insert(room_id, Arc::clone(&room));
        Self::lock(&self.stats).rooms_created += 1;

        info!(
            "Created room {} with {} players (avg rating {:.1})",
            room_id,
            room.player_count(),
            room.average_rating()
        );
        room
    }

    /// Snapshot copy of the room registry values (order unspecified)
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        Self::lock(&self.rooms).values().cloned().collect()
    }

    pub fn room(&self, room_id: RoomId) -> Option<Arc<Room>> {
        Self::lock(&self.rooms).get(&room_id).cloned()
    }

    pub fn room_count(&self) -> usize {
        Self::lock(&self.rooms).len()
    }

    pub fn stats(&self) -> MatchmakerStats {
        Self::lock(&self.stats).clone()
    }

    fn match_loop(self: Arc<Self>) {
        debug!("Matching loop running");
        while self.running.load(Ordering::SeqCst) {
            let force = self.force_match_on_timeout();
            let timeout_ms = self.match_timeout_ms();

            if let Some(group) = self.queue.try_select(self.players_per_room, force, timeout_ms) {
                self.commit_group(group);
            }

            std::thread::sleep(TICK_INTERVAL);
        }
        debug!("Matching loop terminated");
    }

    fn commit_group(&self, group: MatchGroup) {
        let room = self.create_room(&group.players);
        if group.forced {
            Self::lock(&self.stats).matches_forced += 1;
        }

        // Clone the callback out so it runs without any internal lock held.
        let callback = Self::lock(&self.match_notify).clone();
        if let Some(callback) = callback {
            if let Err(e) = callback(&room) {
                error!("Match notify callback failed for room {}: {}", room.id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::strategy::RatingBasedStrategy;
    use crate::utils::now_millis;
    use std::sync::atomic::AtomicUsize;

    fn queued_player(id: u64, rating: i32) -> Arc<Player> {
        let player = Arc::new(Player::new(id, format!("p{}", id), rating));
        player.touch(now_millis());
        player.set_in_queue(true);
        player
    }

    #[test]
    fn test_create_room_assigns_monotonic_ids() {
        let matchmaker = Matchmaker::new(2);

        let r1 = matchmaker.create_room(&[queued_player(1, 1500), queued_player(2, 1500)]);
        let r2 = matchmaker.create_room(&[queued_player(3, 1500), queued_player(4, 1500)]);

        assert!(r2.id() > r1.id());
        assert_eq!(matchmaker.room_count(), 2);
        assert_eq!(matchmaker.stats().rooms_created, 2);
    }

    #[test]
    fn test_loop_matches_compatible_players() {
        let matchmaker = Arc::new(Matchmaker::new(2));
        let notified = Arc::new(AtomicUsize::new(0));
        let notified_clone = Arc::clone(&notified);
        matchmaker.set_match_notify_callback(move |room| {
            assert_eq!(room.player_count(), 2);
            notified_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        matchmaker.start();
        matchmaker.add(queued_player(1, 1500)).unwrap();
        matchmaker.add(queued_player(2, 1600)).unwrap();

        std::thread::sleep(Duration::from_millis(400));
        matchmaker.stop();

        assert_eq!(matchmaker.queue_size(), 0);
        assert_eq!(matchmaker.room_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        let room = matchmaker.rooms().pop().unwrap();
        assert!(room.contains(1));
        assert!(room.contains(2));
        assert!(room.players().iter().all(|p| !p.in_queue()));
    }

    #[test]
    fn test_callback_error_does_not_kill_loop() {
        let matchmaker = Arc::new(Matchmaker::new(2));
        matchmaker
            .set_match_notify_callback(|_room| Err(anyhow::anyhow!("sink unavailable")));

        matchmaker.start();
        matchmaker.add(queued_player(1, 1500)).unwrap();
        matchmaker.add(queued_player(2, 1500)).unwrap();
        std::thread::sleep(Duration::from_millis(300));

        // Loop survived the failing callback and keeps matching.
        matchmaker.add(queued_player(3, 1500)).unwrap();
        matchmaker.add(queued_player(4, 1500)).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        matchmaker.stop();

        assert_eq!(matchmaker.room_count(), 2);
    }

    #[test]
    fn test_stop_is_idempotent_and_clears_queue() {
        let matchmaker = Arc::new(Matchmaker::new(4));
        matchmaker.start();
        matchmaker.start();

        let lonely = queued_player(1, 1500);
        matchmaker.add(Arc::clone(&lonely)).unwrap();

        matchmaker.stop();
        matchmaker.stop();

        assert!(!matchmaker.is_running());
        assert_eq!(matchmaker.queue_size(), 0);
        assert!(!lonely.in_queue());
    }

    #[test]
    fn test_forced_match_counted() {
        let matchmaker = Arc::new(Matchmaker::new(2));
        matchmaker.set_strategy(Arc::new(RatingBasedStrategy::new(50)));
        matchmaker.set_match_timeout_ms(200);
        matchmaker.set_force_match_on_timeout(true);

        let stale = queued_player(1, 1000);
        stale.touch(now_millis() - 1000);
        matchmaker.add(stale).unwrap();
        matchmaker.add(queued_player(2, 2000)).unwrap();

        matchmaker.start();
        std::thread::sleep(Duration::from_millis(400));
        matchmaker.stop();

        assert_eq!(matchmaker.room_count(), 1);
        assert_eq!(matchmaker.stats().matches_forced, 1);
    }
}
