//! Configuration module for Shroud
//!
//! This module provides configuration types and parsing for the relay,
//! the tunnel connector and the facade.

mod facade;
mod relay;
mod transport;

pub use facade::FacadeConfig;
pub use relay::RelayConfig;
pub use transport::{ConnectorConfig, TcpConfig, TlsConfig};

use crate::error::ShroudError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Connector used for every outbound connection the facade makes
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Tunnel relay server, if this process runs one
    #[serde(default)]
    pub relay: Option<RelayConfig>,

    /// REST + WebSocket facade, if this process runs one
    #[serde(default)]
    pub facade: Option<FacadeConfig>,
}

impl Config {
    /// Validate every configured section
    pub fn validate(&self) -> Result<(), ShroudError> {
        if self.relay.is_none() && self.facade.is_none() {
            return Err(ShroudError::Config(
                "nothing to run: configure [relay] and/or [facade]".to_string(),
            ));
        }
        self.connector.validate().map_err(ShroudError::Config)?;
        if let Some(relay) = &self.relay {
            relay.validate().map_err(ShroudError::Config)?;
        }
        if let Some(facade) = &self.facade {
            facade.validate().map_err(ShroudError::Config)?;
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}
