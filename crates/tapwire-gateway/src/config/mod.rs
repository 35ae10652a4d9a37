//! Configuration types for the Tapwire gateway.

mod capture;
mod listen;
mod upstream;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use capture::{QueryConfig, SeedConfig, SimulationConfig, StoreConfig};
pub use listen::{ListenConfig, TlsConfig};
pub use upstream::{ConnectionPoolConfig, PathRewrite, UpstreamConfig};

/// Gateway configuration. Every section is optional in the YAML file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.upstream.validate().map_err(|e| anyhow::anyhow!(e))?;

        for rule in &self.upstream.path_rewrite {
            regex::Regex::new(&rule.pattern).with_context(|| {
                format!("Invalid path_rewrite pattern '{}'", rule.pattern)
            })?;
        }

        if self.store.max_logs == 0 {
            anyhow::bail!("store.max_logs must be at least 1");
        }

        if self.query.default_limit == 0 {
            anyhow::bail!("query.default_limit must be at least 1");
        }

        if self.query.max_pins == 0 {
            anyhow::bail!("query.max_pins must be at least 1");
        }

        if self.simulation.interval_ms == 0 {
            anyhow::bail!("simulation.interval_ms must be greater than 0");
        }

        if let Some(ref tls) = self.listen.tls {
            if tls.cert_path.is_empty() || tls.key_path.is_empty() {
                anyhow::bail!(
                    "TLS configuration requires both 'listen.tls.cert_path' and 'listen.tls.key_path'"
                );
            }
            if self.listen.https_port == self.listen.port {
                anyhow::bail!(
                    "listen.https_port ({}) must differ from listen.port",
                    self.listen.https_port
                );
            }
        }

        Ok(())
    }
}
