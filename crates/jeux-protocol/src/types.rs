//! Packet header layout and the fixed set of packet types.

use crate::error::ProtocolError;

/// Size in bytes of the on-the-wire packet header, including padding.
pub const HEADER_SIZE: usize = 16;

/// The role a player occupies in a game, or a sentinel meaning "none".
///
/// `0` does triple duty as the empty-cell marker, the draw result, and the
/// "no role" sentinel used where a role field is not meaningful — the same
/// overloading the wire format itself uses.
pub type Role = u8;

/// Sentinel role meaning "no role" / draw / empty cell.
pub const NULL_ROLE: Role = 0;
/// The first mover ('X').
pub const FIRST_ROLE: Role = 1;
/// The second mover ('O').
pub const SECOND_ROLE: Role = 2;

/// The complete set of packet types that can appear in a header's `type`
/// byte. Discriminant values are implementation-defined; only the set and
/// semantics are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    // Client -> server requests
    Login = 0,
    Users = 1,
    Invite = 2,
    Revoke = 3,
    Decline = 4,
    Accept = 5,
    Move = 6,
    Resign = 7,

    // Server -> client responses to the request's sender
    Ack = 8,
    Nack = 9,

    // Server -> client asynchronous notifications to a peer session
    Invited = 10,
    Revoked = 11,
    Declined = 12,
    Accepted = 13,
    Moved = 14,
    Resigned = 15,
    Ended = 16,
}

impl PacketType {
    fn from_u8(b: u8) -> Result<Self, ProtocolError> {
        use PacketType::*;
        Ok(match b {
            0 => Login,
            1 => Users,
            2 => Invite,
            3 => Revoke,
            4 => Decline,
            5 => Accept,
            6 => Move,
            7 => Resign,
            8 => Ack,
            9 => Nack,
            10 => Invited,
            11 => Revoked,
            12 => Declined,
            13 => Accepted,
            14 => Moved,
            15 => Resigned,
            16 => Ended,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }
}

/// A fixed 16-byte packet header. Every multi-byte field is transmitted in
/// network byte order; `encode`/`decode` handle that conversion so the rest
/// of the server only ever sees host-order values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub id: u8,
    pub role: Role,
    pub size: u16,
    pub timestamp_sec: u32,
    pub timestamp_nsec: u32,
}

impl PacketHeader {
    /// Builds a header for `packet_type` stamped with the current monotonic
    /// server time. `size` must be the exact payload length in bytes.
    pub fn new(packet_type: PacketType, id: u8, role: Role, size: u16) -> Self {
        let (sec, nsec) = crate::clock::monotonic_timestamp();
        PacketHeader {
            packet_type,
            id,
            role,
            size,
            timestamp_sec: sec,
            timestamp_nsec: nsec,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.packet_type as u8;
        buf[1] = self.id;
        buf[2] = self.role;
        buf[3..5].copy_from_slice(&self.size.to_be_bytes());
        buf[5..9].copy_from_slice(&self.timestamp_sec.to_be_bytes());
        buf[9..13].copy_from_slice(&self.timestamp_nsec.to_be_bytes());
        // buf[13..16] left zeroed: padding to a 16-byte header.
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
        let packet_type = PacketType::from_u8(buf[0])?;
        let id = buf[1];
        let role = buf[2];
        let size = u16::from_be_bytes([buf[3], buf[4]]);
        let timestamp_sec = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);
        let timestamp_nsec = u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]);
        Ok(PacketHeader {
            packet_type,
            id,
            role,
            size,
            timestamp_sec,
            timestamp_nsec,
        })
    }
}

/// A decoded packet: header plus its (possibly empty) payload.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip_preserves_all_fields() {
        let h = PacketHeader {
            packet_type: PacketType::Invited,
            id: 7,
            role: SECOND_ROLE,
            size: 0x1234,
            timestamp_sec: 0xdeadbeef,
            timestamp_nsec: 0x0badf00d,
        };
        let encoded = h.encode();
        let decoded = PacketHeader::decode(&encoded).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn test_header_is_exactly_16_bytes() {
        let h = PacketHeader::new(PacketType::Ack, 0, 0, 0);
        assert_eq!(h.encode().len(), HEADER_SIZE);
    }

    #[test]
    fn test_decode_rejects_unknown_packet_type() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = 200;
        let err = PacketHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPacketType(200)));
    }

    #[test]
    fn test_size_field_is_network_byte_order() {
        let h = PacketHeader::new(PacketType::Moved, 0, 0, 0x0102);
        let encoded = h.encode();
        assert_eq!(encoded[3], 0x01);
        assert_eq!(encoded[4], 0x02);
    }
}
