//! Synthetic traffic so a fresh or freshly reset store is never cold.

use super::types::{now_millis, TrafficRecord};
use rand::seq::SliceRandom;
use rand::Rng;

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];
const URLS: &[&str] = &[
    "/api/v1/completions",
    "/api/v1/chat/completions",
    "/api/v1/models",
    "/api/v1/user/settings",
    "/api/v1/workspace/sync",
];
const STATUSES: &[u16] = &[200, 201, 400, 404, 500];

/// Generates outbound/inbound pairs with plausible timing and sizes.
#[derive(Debug, Clone)]
pub struct Seeder {
    pairs: usize,
    /// Requests are spread over this many milliseconds before "now"
    window_ms: i64,
}

impl Seeder {
    pub fn new(pairs: usize, window_ms: i64) -> Self {
        Self {
            pairs,
            window_ms: window_ms.max(1),
        }
    }

    pub fn pairs(&self) -> usize {
        self.pairs
    }

    /// Records ordered oldest first, ready to be appended in sequence.
    pub fn generate(&self) -> Vec<TrafficRecord> {
        self.generate_at(now_millis())
    }

    pub fn generate_at(&self, now_ms: i64) -> Vec<TrafficRecord> {
        let mut rng = rand::thread_rng();
        let mut records = Vec::with_capacity(self.pairs * 2);

        for _ in 0..self.pairs {
            let method = METHODS.choose(&mut rng).copied().unwrap_or("GET");
            let url = URLS.choose(&mut rng).copied().unwrap_or("/api/v1/models");
            let status = STATUSES.choose(&mut rng).copied().unwrap_or(200);
            let size: u64 = rng.gen_range(0..10_000);
            let sent_at = now_ms - rng.gen_range(0..self.window_ms);
            // Nothing lands after `now_ms`, or live appends would be clamped
            // to a future head.
            let received_at = (sent_at + rng.gen_range(0..1_000)).min(now_ms);

            // Seeded requests carry the status they resolved to.
            let mut request = TrafficRecord::outbound(method, url, size).at(sent_at);
            request.status = status;
            records.push(request);
            records.push(TrafficRecord::inbound(url, status, size * 2).at(received_at));
        }

        // Stable sort keeps each request ahead of a same-millisecond response.
        records.sort_by_key(|r| r.timestamp);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Direction;

    #[test]
    fn test_generates_pairs_in_time_order() {
        let records = Seeder::new(10, 60_000).generate_at(1_000_000);
        assert_eq!(records.len(), 20);
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let outbound = records
            .iter()
            .filter(|r| r.direction == Direction::Outbound)
            .count();
        assert_eq!(outbound, 10);
    }

    #[test]
    fn test_values_within_ranges() {
        let now = 5_000_000;
        for record in Seeder::new(25, 60_000).generate_at(now) {
            assert!(record.timestamp > now - 60_000);
            assert!(record.timestamp <= now);
            assert!(STATUSES.contains(&record.status));
            assert!(URLS.contains(&record.url.as_str()));
            match record.direction {
                Direction::Outbound => {
                    assert!(METHODS.contains(&record.method.as_str()));
                    assert!(record.size < 10_000);
                }
                Direction::Inbound => {
                    assert_eq!(record.method, "RESPONSE");
                    assert!(record.size < 20_000);
                    assert_eq!(record.size % 2, 0);
                }
            }
        }
    }

    #[test]
    fn test_responses_never_postdate_now() {
        let now = 2_000_000;
        // A one-millisecond window sends every request at `now`
        let records = Seeder::new(200, 1).generate_at(now);
        assert!(records.iter().all(|r| r.timestamp <= now));
        let inbound_at_now = records
            .iter()
            .filter(|r| r.direction == Direction::Inbound && r.timestamp == now)
            .count();
        assert_eq!(inbound_at_now, 200);
    }

    #[test]
    fn test_live_append_after_reseed_keeps_its_time() {
        use crate::store::LogStore;

        let store = LogStore::new(100).unwrap();
        let now = now_millis();
        store.reset_with(Seeder::new(50, 1).generate_at(now)).unwrap();
        store.append(TrafficRecord::outbound("GET", "/api/live", 1).at(now));
        assert_eq!(store.snapshot(Some(1)).records[0].timestamp, now);
    }

    #[test]
    fn test_zero_pairs() {
        assert!(Seeder::new(0, 60_000).generate().is_empty());
    }
}
