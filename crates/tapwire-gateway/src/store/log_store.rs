//! Capacity-bounded log store with lifetime counters.

use super::types::{Stats, TrafficRecord};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the log store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("log store capacity must be at least 1")]
    ZeroCapacity,
    #[error("log store busy: lock not acquired within {0:?}")]
    Busy(Duration),
}

/// Destination for intercepted traffic.
///
/// The interceptor only sees this trait, so the store can be swapped for a
/// test double or wrapped without touching the forwarding path.
pub trait TrafficSink: Send + Sync {
    fn record(&self, record: TrafficRecord) -> Result<(), StoreError>;
}

/// Point-in-time view of the store.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Most-recent-first
    pub records: Vec<Arc<TrafficRecord>>,
    pub stats: Stats,
    pub epoch: u64,
}

struct StoreState {
    records: VecDeque<Arc<TrafficRecord>>,
    stats: Stats,
    /// Incremented on every reset
    epoch: u64,
}

impl StoreState {
    fn push(&mut self, mut record: TrafficRecord, capacity: usize) {
        if let Some(head) = self.records.front() {
            record.timestamp = record.timestamp.max(head.timestamp);
        }
        self.stats.count(record.direction);
        self.records.push_front(Arc::new(record));
        while self.records.len() > capacity {
            self.records.pop_back();
        }
    }

    fn clear(&mut self) {
        self.records.clear();
        self.stats = Stats::default();
        self.epoch += 1;
    }
}

/// Most-recent-first ring of traffic records plus lifetime [`Stats`].
///
/// All mutation happens under one write lock, so `append` never interleaves
/// with a reset and readers never observe a half-reset store.
pub struct LogStore {
    state: RwLock<StoreState>,
    capacity: usize,
    /// How long a reset waits for in-flight appends before giving up
    lock_timeout: Duration,
}

impl LogStore {
    pub fn new(capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::ZeroCapacity);
        }
        Ok(Self {
            state: RwLock::new(StoreState {
                records: VecDeque::with_capacity(capacity),
                stats: Stats::default(),
                epoch: 0,
            }),
            capacity,
            lock_timeout: Duration::from_secs(2),
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend a record, evicting the oldest entry beyond capacity.
    ///
    /// The timestamp is clamped so it never precedes the current head.
    pub fn append(&self, record: TrafficRecord) {
        self.state.write().push(record, self.capacity);
    }

    /// Consistent view of up to `limit` most recent records.
    pub fn snapshot(&self, limit: Option<usize>) -> Snapshot {
        let state = self.state.read();
        let take = limit.unwrap_or(usize::MAX);
        Snapshot {
            records: state.records.iter().take(take).cloned().collect(),
            stats: state.stats,
            epoch: state.epoch,
        }
    }

    pub fn stats(&self) -> Stats {
        self.state.read().stats
    }

    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// No records and no counted traffic since start or the last reset.
    pub fn is_pristine(&self) -> bool {
        let state = self.state.read();
        state.records.is_empty() && state.stats.is_zero()
    }

    /// Insert `seed` (oldest first) only if the store is pristine.
    ///
    /// The check and the insert share one critical section, so concurrent
    /// first callers seed exactly once. Returns whether seeding happened.
    pub fn seed_if_pristine<F>(&self, seed: F) -> bool
    where
        F: FnOnce() -> Vec<TrafficRecord>,
    {
        if !self.is_pristine() {
            return false;
        }
        let records = seed();
        let mut state = self.state.write();
        if !state.records.is_empty() || !state.stats.is_zero() {
            return false;
        }
        for record in records {
            state.push(record, self.capacity);
        }
        debug!("Seeded log store with {} records", state.records.len());
        true
    }

    /// Reset and insert `seed` (oldest first) in the same critical section.
    ///
    /// Returns the post-reseed counters.
    pub fn reset_with(&self, seed: Vec<TrafficRecord>) -> Result<Stats, StoreError> {
        let mut state = self
            .state
            .try_write_for(self.lock_timeout)
            .ok_or(StoreError::Busy(self.lock_timeout))?;
        state.clear();
        for record in seed {
            state.push(record, self.capacity);
        }
        Ok(state.stats)
    }
}

impl TrafficSink for LogStore {
    fn record(&self, record: TrafficRecord) -> Result<(), StoreError> {
        self.append(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Direction;
    use proptest::prelude::*;

    fn outbound(n: i64) -> TrafficRecord {
        TrafficRecord::outbound("GET", &format!("/api/{n}"), 0).at(n)
    }

    fn inbound(n: i64) -> TrafficRecord {
        TrafficRecord::inbound(&format!("/api/{n}"), 200, 0).at(n)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(LogStore::new(0).err(), Some(StoreError::ZeroCapacity));
    }

    #[test]
    fn test_append_prepends() {
        let store = LogStore::new(10).unwrap();
        store.append(outbound(1));
        store.append(inbound(2));

        let snapshot = store.snapshot(None);
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].direction, Direction::Inbound);
        assert_eq!(snapshot.records[1].direction, Direction::Outbound);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let store = LogStore::new(3).unwrap();
        for n in 1..=5 {
            store.append(outbound(n));
        }
        let urls: Vec<_> = store
            .snapshot(None)
            .records
            .iter()
            .map(|r| r.url.clone())
            .collect();
        assert_eq!(urls, vec!["/api/5", "/api/4", "/api/3"]);
    }

    #[test]
    fn test_stats_are_lifetime_counters() {
        let store = LogStore::new(2).unwrap();
        for n in 0..5 {
            store.append(outbound(n));
            store.append(inbound(n));
        }
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.stats(),
            Stats {
                incoming: 5,
                outgoing: 5
            }
        );
    }

    #[test]
    fn test_timestamp_clamped_to_head() {
        let store = LogStore::new(10).unwrap();
        store.append(outbound(100));
        store.append(outbound(50));
        let snapshot = store.snapshot(None);
        assert_eq!(snapshot.records[0].timestamp, 100);
    }

    #[test]
    fn test_snapshot_limit() {
        let store = LogStore::new(10).unwrap();
        for n in 0..6 {
            store.append(outbound(n));
        }
        assert_eq!(store.snapshot(Some(4)).records.len(), 4);
        assert_eq!(store.snapshot(Some(0)).records.len(), 0);
    }

    #[test]
    fn test_reset_clears_and_bumps_epoch() {
        let store = LogStore::new(10).unwrap();
        store.append(outbound(1));
        store.append(inbound(2));

        let stats = store.reset_with(Vec::new()).unwrap();
        assert_eq!(stats, Stats::default());
        assert!(store.is_pristine());
        assert_eq!(store.epoch(), 1);
    }

    #[test]
    fn test_reset_with_reseeds_atomically() {
        let store = LogStore::new(10).unwrap();
        store.append(outbound(1));

        let stats = store.reset_with(vec![outbound(10), inbound(11)]).unwrap();
        assert_eq!(
            stats,
            Stats {
                incoming: 1,
                outgoing: 1
            }
        );
        let snapshot = store.snapshot(None);
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].timestamp, 11);
        assert_eq!(snapshot.stats, stats);
    }

    #[test]
    fn test_seed_if_pristine_only_once() {
        let store = LogStore::new(10).unwrap();
        assert!(store.seed_if_pristine(|| vec![outbound(1), inbound(2)]));
        assert!(!store.seed_if_pristine(|| vec![outbound(3)]));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_reset_busy_when_lock_held() {
        let store = LogStore::new(10)
            .unwrap()
            .with_lock_timeout(Duration::from_millis(10));
        let _reader = store.state.read();
        assert!(matches!(
            store.reset_with(Vec::new()),
            Err(StoreError::Busy(_))
        ));
    }

    #[test]
    fn test_concurrent_reset_never_tears() {
        let store = Arc::new(LogStore::new(50).unwrap());
        let seed_len = 4;

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for n in 0..2_000 {
                    store.append(outbound(n));
                }
            })
        };
        let resetter = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let seed = (0..seed_len).map(outbound).collect();
                    store.reset_with(seed).unwrap();
                }
            })
        };

        for _ in 0..2_000 {
            let snapshot = store.snapshot(None);
            // Counters can only exceed the live buffer through eviction.
            let counted = (snapshot.stats.incoming + snapshot.stats.outgoing) as usize;
            assert!(counted >= snapshot.records.len());
        }

        writer.join().unwrap();
        resetter.join().unwrap();
    }

    proptest! {
        #[test]
        fn prop_retains_most_recent_capacity(capacity in 1usize..40, n in 0usize..120) {
            let store = LogStore::new(capacity).unwrap();
            for i in 0..n {
                store.append(outbound(i as i64));
            }
            let snapshot = store.snapshot(None);
            let expected: Vec<String> = (0..n)
                .rev()
                .take(capacity)
                .map(|i| format!("/api/{i}"))
                .collect();
            let actual: Vec<String> = snapshot.records.iter().map(|r| r.url.clone()).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_counters_ignore_eviction(capacity in 1usize..10, outs in 0u64..30, ins in 0u64..30) {
            let store = LogStore::new(capacity).unwrap();
            for i in 0..outs {
                store.append(outbound(i as i64));
            }
            for i in 0..ins {
                store.append(inbound(i as i64));
            }
            prop_assert_eq!(store.stats(), Stats { incoming: ins, outgoing: outs });
        }
    }
}
