//! Tunnel module
//!
//! The relay server side and the client connector side of the
//! handshake-framed tunnel.

mod connector;
mod server;
mod stream;

pub use connector::{destination_of, TunnelConnector};
pub use server::{handle_connection, RelayServer};
pub use stream::{TunnelIo, TunnelStream};
