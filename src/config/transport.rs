//! Transport configuration types
//!
//! Defines socket tuning, TLS client settings and the tunnel connector.

use serde::{Deserialize, Serialize};

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

fn default_nodelay() -> bool {
    true
}

/// TCP socket configuration applied to relay and connector sockets
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

/// TLS client configuration used when re-establishing TLS through the tunnel
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// Extra PEM file with trusted root certificates
    #[serde(default)]
    pub trusted_root: Option<String>,

    /// Skip certificate verification (testing only)
    #[serde(default)]
    pub skip_verify: bool,
}

fn default_relay_addr() -> String {
    "127.0.0.1:7210".to_string()
}

/// Tunnel connector configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectorConfig {
    /// Address of the tunnel relay server every outbound connection goes through
    #[serde(default = "default_relay_addr")]
    pub relay_addr: String,

    /// Socket options for the connection to the relay
    #[serde(default)]
    pub tcp: TcpConfig,

    /// TLS client settings
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            relay_addr: default_relay_addr(),
            tcp: TcpConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl ConnectorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.relay_addr.trim().is_empty() {
            return Err("connector.relay_addr must not be empty".to_string());
        }
        Ok(())
    }
}
