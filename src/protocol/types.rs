//! Tunnel handshake types
//!
//! Every tunnel connection starts with exactly one handshake frame:
//!
//! ```text
//! +----------------+---------------------------+------------------------
//! | u32 BE length  | UTF-8 JSON {"host","port"} | tunneled bytes ...
//! +----------------+---------------------------+------------------------
//! ```

use serde::{Deserialize, Serialize};

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest JSON payload a relay accepts in a handshake
pub const MAX_HANDSHAKE_LEN: usize = 8 * 1024;

/// Logical destination announced by the connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeFrame {
    /// Destination host name or literal address
    pub host: String,
    /// Destination port
    pub port: u16,
}

impl HandshakeFrame {
    /// Create a new handshake frame
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        HandshakeFrame {
            host: host.into(),
            port,
        }
    }
}
