//! Reset Control and first-observation seeding.

use crate::config::SeedConfig;
use crate::metrics;
use crate::store::{LogStore, Seeder, Stats, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResetError {
    #[error("reset failed: {0}")]
    Store(#[from] StoreError),
}

/// Clears the store and reseeds it so an idle consumer still sees traffic.
pub struct ResetControl {
    store: Arc<LogStore>,
    seeder: Seeder,
    auto_seed: bool,
}

impl ResetControl {
    pub fn new(store: Arc<LogStore>, seed: &SeedConfig) -> Self {
        Self {
            store,
            seeder: Seeder::new(seed.pairs, seed.window_ms),
            auto_seed: seed.auto_seed,
        }
    }

    /// Zero the counters, empty the store and reseed, as one critical
    /// section. Returns the post-reseed counters.
    pub fn reset(&self) -> Result<Stats, ResetError> {
        let seed = self.seeder.generate();
        match self.store.reset_with(seed) {
            Ok(stats) => {
                metrics::record_reset();
                metrics::set_store_size(self.store.len());
                info!(
                    "Log store reset (epoch {}), reseeded {} pairs",
                    self.store.epoch(),
                    self.seeder.pairs()
                );
                Ok(stats)
            }
            Err(e) => {
                warn!("Log store reset failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Seed synthetic traffic if nothing has been recorded yet.
    pub fn ensure_seeded(&self) -> bool {
        if !self.auto_seed {
            return false;
        }
        let seeded = self.store.seed_if_pristine(|| self.seeder.generate());
        if seeded {
            info!("Seeded {} synthetic pairs on first observation", self.seeder.pairs());
        }
        seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TrafficRecord;

    fn seed_config(pairs: usize, auto_seed: bool) -> SeedConfig {
        SeedConfig {
            auto_seed,
            pairs,
            ..SeedConfig::default()
        }
    }

    #[test]
    fn test_reset_reseeds_and_reports_new_stats() {
        let store = Arc::new(LogStore::new(100).unwrap());
        for i in 0..7 {
            store.append(TrafficRecord::outbound("GET", &format!("/api/{i}"), 1));
        }
        let control = ResetControl::new(store.clone(), &seed_config(5, true));

        let stats = control.reset().unwrap();
        assert_eq!(stats, Stats { incoming: 5, outgoing: 5 });
        assert_eq!(store.len(), 10);
        assert_eq!(store.epoch(), 1);
        assert!(store
            .snapshot(None)
            .records
            .iter()
            .all(|r| r.url.starts_with("/api/v1/")));
    }

    #[test]
    fn test_reset_without_pairs_empties_store() {
        let store = Arc::new(LogStore::new(100).unwrap());
        store.append(TrafficRecord::outbound("GET", "/api/x", 1));
        let control = ResetControl::new(store.clone(), &seed_config(0, true));

        assert_eq!(control.reset().unwrap(), Stats::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_ensure_seeded_only_once() {
        let store = Arc::new(LogStore::new(100).unwrap());
        let control = ResetControl::new(store.clone(), &seed_config(10, true));

        assert!(control.ensure_seeded());
        assert!(!control.ensure_seeded());
        assert_eq!(store.stats(), Stats { incoming: 10, outgoing: 10 });
    }

    #[test]
    fn test_ensure_seeded_skips_live_traffic() {
        let store = Arc::new(LogStore::new(100).unwrap());
        store.append(TrafficRecord::outbound("GET", "/api/x", 1));
        let control = ResetControl::new(store.clone(), &seed_config(10, true));
        assert!(!control.ensure_seeded());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_auto_seed_disabled() {
        let store = Arc::new(LogStore::new(100).unwrap());
        let control = ResetControl::new(store.clone(), &seed_config(10, false));
        assert!(!control.ensure_seeded());
        assert!(store.is_pristine());
    }
}
