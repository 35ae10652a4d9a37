//! Listener and TLS configuration.

use serde::{Deserialize, Serialize};

/// PEM key/certificate pair for the HTTPS listener.
///
/// Provisioning the pair is an external step; the gateway only loads it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to TLS certificate file (PEM format)
    pub cert_path: String,
    /// Path to TLS private key file (PEM format)
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Plain HTTP port, always served
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// HTTPS port, served only when `tls` is set
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    7778
}

fn default_https_port() -> u16 {
    443
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            https_port: default_https_port(),
            tls: None,
        }
    }
}
