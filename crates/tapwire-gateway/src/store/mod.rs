//! In-memory traffic log.
//!
//! Holds the bounded, most-recent-first history of intercepted traffic and
//! the lifetime counters reported by `/stats`. History is memory-resident
//! only and is lost on restart.
//!
//! # Module Structure
//!
//! - `types` - Traffic records, directions and counters
//! - `log_store` - The capacity-bounded store and the `TrafficSink` seam
//! - `seed` - Synthetic traffic used on first observation and after reset

mod log_store;
mod seed;
mod types;

pub use log_store::{LogStore, Snapshot, StoreError, TrafficSink};
pub use seed::Seeder;
pub use types::{now_millis, BodyEncoding, Direction, Stats, TrafficRecord, RESPONSE_METHOD};
