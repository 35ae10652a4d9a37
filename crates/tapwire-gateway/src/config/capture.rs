//! Log store, chunked query, seeding and simulation settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Maximum number of records kept in memory
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
    /// Bodies larger than this are captured truncated
    #[serde(default = "default_max_capture_bytes")]
    pub max_capture_bytes: usize,
    /// How long `/reset` waits for the store lock
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_max_logs() -> usize {
    100
}

fn default_max_capture_bytes() -> usize {
    1024 * 1024
}

fn default_reset_timeout_ms() -> u64 {
    2_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_logs: default_max_logs(),
            max_capture_bytes: default_max_capture_bytes(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Records per chunk when the caller does not pass `limit`
    #[serde(default = "default_chunk_limit")]
    pub default_limit: usize,
    /// Bodies above this size are reported as `bodyOmitted`
    #[serde(default = "default_max_inline_body_bytes")]
    pub max_inline_body_bytes: usize,
    /// Body/header budget for a single chunk
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: usize,
    /// Lifetime of a pinned chunk snapshot
    #[serde(default = "default_pin_ttl_secs")]
    pub pin_ttl_secs: u64,
    /// Maximum number of concurrently pinned snapshots
    #[serde(default = "default_max_pins")]
    pub max_pins: usize,
}

fn default_chunk_limit() -> usize {
    10
}

fn default_max_inline_body_bytes() -> usize {
    64 * 1024
}

fn default_max_page_bytes() -> usize {
    512 * 1024
}

fn default_pin_ttl_secs() -> u64 {
    30
}

fn default_max_pins() -> usize {
    64
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_chunk_limit(),
            max_inline_body_bytes: default_max_inline_body_bytes(),
            max_page_bytes: default_max_page_bytes(),
            pin_ttl_secs: default_pin_ttl_secs(),
            max_pins: default_max_pins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedConfig {
    /// Seed synthetic traffic the first time an empty store is observed
    #[serde(default = "default_true")]
    pub auto_seed: bool,
    /// Outbound/inbound pairs generated per seeding
    #[serde(default = "default_seed_pairs")]
    pub pairs: usize,
    /// Seeded requests are spread over this window before "now"
    #[serde(default = "default_seed_window_ms")]
    pub window_ms: i64,
}

fn default_true() -> bool {
    true
}

fn default_seed_pairs() -> usize {
    10
}

fn default_seed_window_ms() -> i64 {
    60_000
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            auto_seed: true,
            pairs: default_seed_pairs(),
            window_ms: default_seed_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Start the synthetic traffic generator at boot
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_simulation_interval_ms")]
    pub interval_ms: u64,
    /// Delay between a simulated request and its response
    #[serde(default = "default_simulation_response_delay_ms")]
    pub response_delay_ms: u64,
}

fn default_simulation_interval_ms() -> u64 {
    5_000
}

fn default_simulation_response_delay_ms() -> u64 {
    500
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_simulation_interval_ms(),
            response_delay_ms: default_simulation_response_delay_ms(),
        }
    }
}
