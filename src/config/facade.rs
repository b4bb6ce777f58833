//! Facade configuration

use crate::facade::AuthorizationMapping;
use serde::{Deserialize, Serialize};

fn default_api_base() -> String {
    "https://discord.com/api".to_string()
}

fn default_gateway_base() -> String {
    "wss://gateway.discord.gg".to_string()
}

/// REST + WebSocket facade configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FacadeConfig {
    /// Addresses to listen on (e.g., "127.0.0.1:7212")
    pub listeners: Vec<String>,

    /// WebSocket address handed out to clients in place of the real gateway.
    /// Defaults to `ws://<first listener>`.
    #[serde(default)]
    pub public_ws_url: Option<String>,

    /// Base URL of the real REST API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base URL of the real gateway
    #[serde(default = "default_gateway_base")]
    pub gateway_base: String,

    /// Placeholder credential to real credential
    #[serde(default)]
    pub authorizations: AuthorizationMapping,
}

impl FacadeConfig {
    /// WebSocket address advertised to clients
    pub fn public_ws_url(&self) -> String {
        match &self.public_ws_url {
            Some(url) => url.clone(),
            None => format!(
                "ws://{}",
                self.listeners.first().map(String::as_str).unwrap_or("127.0.0.1:7212")
            ),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listeners.is_empty() {
            return Err("facade.listeners must contain at least one address".to_string());
        }
        for (name, base) in [("api_base", &self.api_base), ("gateway_base", &self.gateway_base)] {
            if url::Url::parse(base).is_err() {
                return Err(format!("facade.{} is not a valid URL: {}", name, base));
            }
        }
        if !self.gateway_base.starts_with("ws://") && !self.gateway_base.starts_with("wss://") {
            return Err(format!(
                "facade.gateway_base must use ws:// or wss://, got {}",
                self.gateway_base
            ));
        }
        Ok(())
    }
}
