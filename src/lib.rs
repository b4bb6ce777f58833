//! # Shroud - Handshake-Framed Tunnel Relay and API Facade
//!
//! Shroud funnels outbound connections through a small relay. A client opens
//! a TCP connection to the relay, sends one length-prefixed JSON handshake
//! naming its real destination, and from then on the connection is a raw
//! byte pipe to that destination. The relay can chain every dial through a
//! SOCKS4/4a/5/5h proxy.
//!
//! On top of the tunnel sits a facade: an HTTP + WebSocket reverse proxy that
//! mimics a REST API and its gateway, substitutes placeholder credentials
//! for real ones, and rewrites the gateway addresses it hands out so clients
//! keep coming back through it.
//!
//! ## Features
//!
//! - **Tunnel relay**: one handshake per connection, early bytes preserved
//! - **SOCKS chaining**: `socks4`, `socks4a`, `socks5`, `socks5h` with credentials
//! - **Tunnel connector**: per-request streams and a pooled hyper connector,
//!   with TLS re-established for the destination over the relay socket
//! - **Facade**: REST forwarding and gateway session relaying with credential
//!   substitution
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shroud::config::load_config;
//! use shroud::tunnel::{RelayServer, TunnelConnector};
//! use shroud::facade::FacadeServer;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, _) = broadcast::channel(1);
//!
//!     let relay = RelayServer::bind(config.relay.as_ref().unwrap()).await?;
//!     tokio::spawn(relay.run(shutdown_tx.subscribe()));
//!
//!     let connector = TunnelConnector::from_config(&config.connector)?;
//!     let facade = FacadeServer::bind(config.facade.as_ref().unwrap(), connector).await?;
//!     facade.run(shutdown_tx.subscribe()).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client -> Facade -> TunnelConnector -> Relay -> [SOCKS proxy] -> Upstream
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod facade;
pub mod helper;
pub mod protocol;
pub mod socks;
pub mod transport;
pub mod tunnel;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::ShroudError;
pub use facade::{AuthorizationMapping, FacadeServer};
pub use socks::ProxyDescriptor;
pub use tunnel::{RelayServer, TunnelConnector};

/// Version of the Shroud library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
