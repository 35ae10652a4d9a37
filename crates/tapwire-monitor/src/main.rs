//! Tapwire Monitor
//!
//! # Usage
//!
//! ```bash
//! # Watch a local gateway until Ctrl-C
//! tapwire-monitor
//!
//! # One forced poll, printed as JSON
//! tapwire-monitor --gateway-url http://gateway:7778 snapshot
//!
//! # Clear the gateway's logs and stats
//! tapwire-monitor reset
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tapwire_monitor::logging::{self, NoiseFilter, DEFAULT_NOISE};
use tapwire_monitor::{
    ApiClient, MergePolicy, Monitor, MonitorConfig, PollMode, PollScheduler, PollTiers,
    TrafficFilter,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tapwire-monitor")]
#[command(author, version, about = "Adaptive polling monitor for the Tapwire gateway")]
struct Args {
    /// Gateway base URL
    #[arg(
        short,
        long,
        default_value = "http://localhost:7778",
        env = "TAPWIRE_GATEWAY_URL"
    )]
    gateway_url: String,

    /// Records per chunk when fetching contents
    #[arg(long, default_value_t = 10, env = "TAPWIRE_CHUNK_LIMIT")]
    chunk_limit: usize,

    /// Byte budget of each content history buffer
    #[arg(long, default_value_t = 1024 * 1024, env = "TAPWIRE_BUFFER_LIMIT")]
    buffer_limit: usize,

    /// Delay after a poll that saw new traffic
    #[arg(long, default_value_t = 1000)]
    burst_ms: u64,

    /// Delay while traffic has been quiet for under 5 seconds
    #[arg(long, default_value_t = 2000)]
    short_ms: u64,

    /// Delay while traffic has been quiet for under 30 seconds
    #[arg(long, default_value_t = 5000)]
    medium_ms: u64,

    /// Delay once traffic has been quiet for 30 seconds or more
    #[arg(long, default_value_t = 10000)]
    long_ms: u64,

    /// Which chunk wins when keyed chunks share a key
    #[arg(long, value_enum, default_value_t = MergePolicy::LastWins)]
    merge_policy: MergePolicy,

    /// Suppress log events containing this text (repeatable)
    #[arg(long = "deny", default_values_t = DEFAULT_NOISE.iter().map(|s| s.to_string()).collect::<Vec<_>>())]
    deny: Vec<String>,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Poll until Ctrl-C, reporting new traffic (default)
    Watch,
    /// Run one forced poll and print the view as JSON
    Snapshot,
    /// Reset the gateway and print the post-reset stats
    Reset,
}

impl Args {
    fn tiers(&self) -> PollTiers {
        PollTiers {
            burst: Duration::from_millis(self.burst_ms),
            short: Duration::from_millis(self.short_ms),
            medium: Duration::from_millis(self.medium_ms),
            long: Duration::from_millis(self.long_ms),
            ..PollTiers::default()
        }
    }

    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            chunk_limit: self.chunk_limit,
            buffer_limit: self.buffer_limit,
            merge_policy: self.merge_policy,
            filter: TrafficFilter::default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(NoiseFilter::new(args.deny.iter().cloned()));

    let client = ApiClient::new(&args.gateway_url, Duration::from_secs(args.timeout_secs))
        .context("Failed to create HTTP client")?;
    let mut monitor = Monitor::new(client, args.monitor_config());

    match args.command.unwrap_or(Command::Watch) {
        Command::Watch => {
            info!("Watching gateway at {}", args.gateway_url);
            let handle = PollScheduler::new(monitor, args.tiers()).spawn();
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
            handle.shutdown();
            handle.join().await;
        }
        Command::Snapshot => {
            monitor
                .poll_once(PollMode::INITIAL)
                .await
                .with_context(|| format!("Failed to poll {}", args.gateway_url))?;
            if let Some(error) = monitor.last_error() {
                anyhow::bail!("Failed to reassemble log contents: {}", error);
            }
            println!("{}", serde_json::to_string_pretty(&monitor.view())?);
        }
        Command::Reset => {
            let stats = monitor
                .reset()
                .await
                .with_context(|| format!("Failed to reset {}", args.gateway_url))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
