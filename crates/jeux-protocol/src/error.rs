//! Errors produced while framing or parsing packets on the wire.

/// Failure modes for the packet codec.
///
/// Framing errors are always fatal to the connection that produced them;
/// callers should drop the socket rather than attempt to resynchronize.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("connection closed by peer")]
    Eof,

    #[error("I/O error on packet transmission: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet type byte {0} is not a recognized packet type")]
    UnknownPacketType(u8),

    #[error("payload length {0} exceeds the maximum of {max}", max = u16::MAX)]
    PayloadTooLarge(usize),
}
