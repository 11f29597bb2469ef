//! Wire protocol for the jeux game server: a fixed 16-byte header plus an
//! opaque payload, framed on a raw TCP byte stream.
//!
//! This crate owns the one layer that is allowed to touch socket bytes
//! directly ([`codec::send_packet`] / [`codec::recv_packet`]); everything
//! above it deals in typed [`PacketHeader`]/[`Packet`] values.

pub mod clock;
pub mod codec;
pub mod error;
pub mod types;

pub use codec::{recv_packet, send_packet};
pub use error::ProtocolError;
pub use types::{
    Packet, PacketHeader, PacketType, Role, FIRST_ROLE, HEADER_SIZE, NULL_ROLE, SECOND_ROLE,
};
