//! SOCKS module for Shroud
//!
//! The relay can chain its outbound dials through a SOCKS 4/4a/5/5h proxy.
//! Only the client side of the protocol is used here; the wire protocol
//! itself comes from `tokio-socks`.

mod descriptor;
mod dial;

pub use descriptor::{Credentials, ProxyDescriptor, SocksVersion, DEFAULT_SOCKS_PORT};
pub use dial::SocksDialer;
