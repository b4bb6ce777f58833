//! Relay server configuration

use super::TcpConfig;
use serde::{Deserialize, Serialize};

/// Tunnel relay server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    /// Addresses to listen on (e.g., "127.0.0.1:7210")
    pub listeners: Vec<String>,

    /// Optional SOCKS proxy URI every outbound dial is chained through
    #[serde(default)]
    pub proxy: Option<String>,

    /// Socket options for accepted and dialed sockets
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Connect timeout for direct dials in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

fn default_connect_timeout() -> u64 {
    crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS
}

impl RelayConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listeners.is_empty() {
            return Err("relay.listeners must contain at least one address".to_string());
        }
        Ok(())
    }
}
