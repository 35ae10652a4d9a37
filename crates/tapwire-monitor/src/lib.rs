//! Tapwire Monitor - adaptive polling consumer for the Tapwire gateway
//!
//! Polls the gateway's `/logs` and `/stats` endpoints, backing off while
//! traffic is quiet, reassembles chunked log queries and keeps a bounded
//! history of the most recent request and response contents.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tapwire_monitor::{ApiClient, Monitor, MonitorConfig, PollScheduler, PollTiers};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ApiClient::new("http://localhost:7778", Duration::from_secs(10))?;
//!     let monitor = Monitor::new(client, MonitorConfig::default());
//!     let handle = PollScheduler::new(monitor, PollTiers::default()).spawn();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod buffer;
pub mod chunk;
pub mod content;
pub mod logging;
pub mod monitor;
pub mod poller;

pub use api::{ApiClient, ApiError, LogRecord, LogSource, Stats};
pub use chunk::{ChunkEnvelope, ChunkShape, ChunkSource, MergePolicy, ReassemblyError, Reassembler};
pub use monitor::{Monitor, MonitorConfig, MonitorError, TrafficFilter};
pub use poller::{PollHandle, PollMode, PollScheduler, PollTiers};
