//! In-flight request coalescing.
//!
//! The first caller to [`Coalescer::begin`] a key becomes its [`Leader`] and
//! is expected to compute the response. Callers arriving for the same key
//! while the leader is running become [`Follower`]s and wait for the leader's
//! [`Settlement`] instead of running the handler themselves.
//!
//! Registration and teardown for a key both happen under the owning shard's
//! lock of a [`DashMap`], so a follower either registers before the leader
//! settles (and is woken) or after (and starts a new episode). Keys on other
//! shards never contend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{CacheKey, Snapshot};

/// Outcome the leader hands to its followers.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// The leader produced a cacheable response; followers replay it.
    Cached(Arc<Snapshot>),
    /// The leader's response must not be shared; followers run the handler
    /// themselves.
    Uncacheable,
    /// The leader never finished (panic or cancellation); followers run the
    /// handler themselves.
    Failed,
}

#[derive(Default)]
struct InFlight {
    waiters: Vec<(u64, oneshot::Sender<Settlement>)>,
}

/// Per-key registry of computations currently in progress.
#[derive(Default)]
pub struct Coalescer {
    in_flight: DashMap<CacheKey, InFlight>,
    next_waiter: AtomicU64,
}

/// The caller's part in a cache-miss episode.
pub enum Role {
    Leader(Leader),
    Follower(Follower),
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the episode for `key`, starting one if none is in flight.
    pub fn begin(self: &Arc<Self>, key: &CacheKey) -> Role {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut record) => {
                let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = oneshot::channel();
                record.get_mut().waiters.push((id, sender));
                Role::Follower(Follower {
                    coalescer: Arc::clone(self),
                    key: key.clone(),
                    id,
                    receiver,
                    settled: false,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlight::default());
                Role::Leader(Leader {
                    coalescer: Arc::clone(self),
                    key: key.clone(),
                    settled: false,
                })
            }
        }
    }

    /// Returns `true` while a leader holds `key`.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Number of followers currently waiting on `key`.
    pub fn follower_count(&self, key: &CacheKey) -> usize {
        self.in_flight
            .get(key)
            .map(|record| record.waiters.len())
            .unwrap_or(0)
    }

    /// Number of keys with a computation in flight.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    // Tears down the record for `key` and wakes its followers in registration
    // order. Returns how many were still listening.
    fn release(&self, key: &CacheKey, settlement: Settlement) -> usize {
        let Some((_, record)) = self.in_flight.remove(key) else {
            return 0;
        };
        record
            .waiters
            .into_iter()
            .map(|(_, sender)| sender.send(settlement.clone()))
            .filter(Result::is_ok)
            .count()
    }

    fn unregister(&self, key: &CacheKey, id: u64) {
        if let Some(mut record) = self.in_flight.get_mut(key) {
            record.waiters.retain(|(waiter, _)| *waiter != id);
        }
    }
}

/// The caller responsible for computing the response.
///
/// Call [`settle`](Self::settle) exactly once when the handler completes.
/// Dropping a `Leader` without settling (the handler panicked or the request
/// was cancelled) settles with [`Settlement::Failed`], so the key is never
/// left blocked.
#[must_use = "followers wait until the leader settles"]
pub struct Leader {
    coalescer: Arc<Coalescer>,
    key: CacheKey,
    settled: bool,
}

impl Leader {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Delivers `settlement` to every registered follower and clears the key.
    /// Returns the number of followers released.
    pub fn settle(mut self, settlement: Settlement) -> usize {
        self.settled = true;
        let released = self.coalescer.release(&self.key, settlement);
        debug!(key = %self.key, released, "in-flight request settled");
        released
    }
}

impl Drop for Leader {
    fn drop(&mut self) {
        if !self.settled {
            let released = self.coalescer.release(&self.key, Settlement::Failed);
            warn!(key = %self.key, released, "leader dropped before settling");
        }
    }
}

/// A caller waiting on another request's computation.
///
/// Dropping a follower before it is woken removes its registration; the
/// leader and other followers are unaffected.
#[must_use = "a follower must be awaited to receive the leader's result"]
pub struct Follower {
    coalescer: Arc<Coalescer>,
    key: CacheKey,
    id: u64,
    receiver: oneshot::Receiver<Settlement>,
    settled: bool,
}

impl Follower {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Waits for the leader to settle.
    pub async fn wait(mut self) -> Settlement {
        let settlement = (&mut self.receiver).await.unwrap_or(Settlement::Failed);
        self.settled = true;
        settlement
    }
}

impl Drop for Follower {
    fn drop(&mut self) {
        if !self.settled {
            self.coalescer.unregister(&self.key, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, StatusCode};
    use std::time::Duration;

    fn key(s: &str) -> CacheKey {
        CacheKey::from(s)
    }

    fn expect_leader(role: Role) -> Leader {
        match role {
            Role::Leader(leader) => leader,
            Role::Follower(_) => panic!("expected leader"),
        }
    }

    fn expect_follower(role: Role) -> Follower {
        match role {
            Role::Follower(follower) => follower,
            Role::Leader(_) => panic!("expected follower"),
        }
    }

    #[tokio::test]
    async fn one_leader_per_key() {
        let coalescer = Arc::new(Coalescer::new());
        let leader = expect_leader(coalescer.begin(&key("a")));
        let _f1 = expect_follower(coalescer.begin(&key("a")));
        let _f2 = expect_follower(coalescer.begin(&key("a")));
        let other = expect_leader(coalescer.begin(&key("b")));

        assert_eq!(coalescer.follower_count(&key("a")), 2);
        assert_eq!(coalescer.in_flight_len(), 2);
        drop(other);
        assert_eq!(leader.key(), &key("a"));
    }

    #[tokio::test]
    async fn followers_receive_the_settled_snapshot() {
        let coalescer = Arc::new(Coalescer::new());
        let leader = expect_leader(coalescer.begin(&key("k")));
        let followers: Vec<_> = (0..3)
            .map(|_| expect_follower(coalescer.begin(&key("k"))))
            .collect();

        let snapshot = Arc::new(Snapshot::new(StatusCode::Ok, Headers::new(), "shared"));
        assert_eq!(leader.settle(Settlement::Cached(Arc::clone(&snapshot))), 3);
        assert!(!coalescer.is_in_flight(&key("k")));

        for follower in followers {
            match follower.wait().await {
                Settlement::Cached(got) => assert!(Arc::ptr_eq(&got, &snapshot)),
                other => panic!("unexpected settlement {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn followers_wake_in_registration_order() {
        let coalescer = Arc::new(Coalescer::new());
        let leader = expect_leader(coalescer.begin(&key("k")));
        let woken = Arc::new(std::sync::Mutex::new(Vec::new()));

        let tasks: Vec<_> = (0..4)
            .map(|n| {
                let follower = expect_follower(coalescer.begin(&key("k")));
                let woken = Arc::clone(&woken);
                tokio::spawn(async move {
                    let settlement = follower.wait().await;
                    woken.lock().unwrap().push((n, settlement));
                })
            })
            .collect();
        // every follower is parked on its channel before the leader settles
        tokio::task::yield_now().await;

        assert_eq!(leader.settle(Settlement::Uncacheable), 4);
        for task in tasks {
            task.await.unwrap();
        }

        let woken = woken.lock().unwrap();
        let order: Vec<_> = woken.iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert!(woken.iter().all(|(_, s)| matches!(s, Settlement::Uncacheable)));
    }

    #[tokio::test]
    async fn next_episode_gets_a_new_leader() {
        let coalescer = Arc::new(Coalescer::new());
        let leader = expect_leader(coalescer.begin(&key("k")));
        leader.settle(Settlement::Uncacheable);
        let _again = expect_leader(coalescer.begin(&key("k")));
    }

    #[tokio::test]
    async fn dropped_leader_settles_as_failed() {
        let coalescer = Arc::new(Coalescer::new());
        let leader = expect_leader(coalescer.begin(&key("k")));
        let follower = expect_follower(coalescer.begin(&key("k")));

        drop(leader);
        assert!(matches!(follower.wait().await, Settlement::Failed));
        assert!(!coalescer.is_in_flight(&key("k")));
    }

    #[tokio::test]
    async fn cancelled_follower_unregisters() {
        let coalescer = Arc::new(Coalescer::new());
        let leader = expect_leader(coalescer.begin(&key("k")));
        let stays = expect_follower(coalescer.begin(&key("k")));
        let leaves = expect_follower(coalescer.begin(&key("k")));
        assert_eq!(coalescer.follower_count(&key("k")), 2);

        let timed_out = tokio::time::timeout(Duration::from_millis(5), leaves.wait()).await;
        assert!(timed_out.is_err());
        assert_eq!(coalescer.follower_count(&key("k")), 1);

        assert_eq!(leader.settle(Settlement::Uncacheable), 1);
        assert!(matches!(stays.wait().await, Settlement::Uncacheable));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_begin_elects_exactly_one_leader() {
        let coalescer = Arc::new(Coalescer::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let coalescer = Arc::clone(&coalescer);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    match coalescer.begin(&key("hot")) {
                        Role::Leader(leader) => {
                            while coalescer.follower_count(&key("hot")) < 15 {
                                tokio::task::yield_now().await;
                            }
                            leader.settle(Settlement::Uncacheable);
                            true
                        }
                        Role::Follower(follower) => {
                            assert!(matches!(follower.wait().await, Settlement::Uncacheable));
                            false
                        }
                    }
                })
            })
            .collect();

        let mut leaders = 0;
        for task in tasks {
            if task.await.unwrap() {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1);
        assert_eq!(coalescer.in_flight_len(), 0);
    }
}
