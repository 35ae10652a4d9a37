//! Upstream target and connection pool configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL of the intercepted API host, e.g. `https://api.example.com`
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Requests under this path prefix are proxied; everything else is the
    /// gateway's own control surface.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Ordered path rewrite rules applied before forwarding
    #[serde(default = "default_path_rewrite")]
    pub path_rewrite: Vec<PathRewrite>,
    /// Skip TLS certificate verification (for self-signed certs in dev/test)
    #[serde(default)]
    pub tls_skip_verify: bool,
}

/// Regex rewrite of the forwarded path (`pattern` is matched against the
/// path and query).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PathRewrite {
    pub pattern: String,
    pub replacement: String,
}

fn default_upstream_url() -> String {
    "https://api2.cursor.sh".to_string()
}

fn default_path_prefix() -> String {
    "/api".to_string()
}

fn default_path_rewrite() -> Vec<PathRewrite> {
    vec![PathRewrite {
        pattern: "^/api".to_string(),
        replacement: "/api".to_string(),
    }]
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            path_prefix: default_path_prefix(),
            path_rewrite: default_path_rewrite(),
            tls_skip_verify: false,
        }
    }
}

/// Paths served by the gateway itself
const CONTROL_PATHS: [&str; 6] = [
    "/health",
    "/metrics",
    "/logs",
    "/stats",
    "/reset",
    "/simulation/toggle",
];

impl UpstreamConfig {
    /// Validate the upstream URL and proxied prefix
    pub fn validate(&self) -> Result<(), String> {
        let uri: hyper::Uri = self
            .url
            .parse()
            .map_err(|e| format!("Invalid upstream URL '{}': {e}", self.url))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(other) => {
                return Err(format!(
                    "Unsupported upstream scheme '{other}'. Currently supported: http, https"
                ))
            }
            None => return Err(format!("Upstream URL '{}' is missing a scheme", self.url)),
        }
        if uri.host().is_none() {
            return Err(format!("Upstream URL '{}' is missing a host", self.url));
        }
        if !self.path_prefix.starts_with('/') {
            return Err(format!(
                "Upstream path_prefix '{}' must start with '/'",
                self.path_prefix
            ));
        }
        let prefix = self.path_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(format!(
                "Upstream path_prefix '{}' would proxy the control surface",
                self.path_prefix
            ));
        }
        if let Some(path) = CONTROL_PATHS.iter().find(|path| {
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        }) {
            return Err(format!(
                "Upstream path_prefix '{}' shadows control endpoint '{path}'",
                self.path_prefix
            ));
        }
        Ok(())
    }

    /// Upstream base without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_pool_max_idle_per_host() -> usize {
    32
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}
