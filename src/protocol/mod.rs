//! Tunnel protocol module
//!
//! Wire format shared by the tunnel connector and the relay server.

mod codec;
mod types;

pub use codec::{decode_handshake, encode_handshake, read_handshake, write_handshake};
pub use types::{HandshakeFrame, LENGTH_PREFIX_LEN, MAX_HANDSHAKE_LEN};
