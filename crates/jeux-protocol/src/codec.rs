//! Framing a packet (header + optional payload) on an async byte stream.
//!
//! These are the only two functions that should ever touch the wire
//! directly; everything above this layer deals in [`Packet`] values.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::types::{Packet, PacketHeader, HEADER_SIZE};

/// Writes `header` followed by `payload` (if `header.size > 0`).
///
/// Callers are responsible for serializing concurrent writers on the same
/// stream (the network write lock) — this function does not lock anything
/// itself, so that a single `send_packet` call's two `write_all`s are never
/// interleaved with another task's.
pub async fn send_packet<W>(
    writer: &mut W,
    header: &PacketHeader,
    payload: Option<&[u8]>,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&header.encode()).await?;
    if header.size > 0 {
        if let Some(data) = payload {
            writer.write_all(data).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Reads one packet, blocking until the header and any payload have
/// arrived in full. Returns [`ProtocolError::Eof`] if the peer closed the
/// connection before a single byte of a new header was read.
pub async fn recv_packet<R>(reader: &mut R) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ProtocolError::Eof),
        Err(e) => return Err(e.into()),
    }
    let header = PacketHeader::decode(&header_buf)?;

    let payload = if header.size > 0 {
        let mut buf = vec![0u8; header.size as usize];
        reader.read_exact(&mut buf).await?;
        buf
    } else {
        Vec::new()
    };

    Ok(Packet { header, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PacketType, FIRST_ROLE};

    #[tokio::test]
    async fn test_send_then_recv_roundtrips_header_and_payload() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let header = PacketHeader::new(PacketType::Invited, 3, FIRST_ROLE, 5);
        let payload = b"alice";

        send_packet(&mut client, &header, Some(payload)).await.unwrap();
        let received = recv_packet(&mut server).await.unwrap();

        assert_eq!(received.header.packet_type, PacketType::Invited);
        assert_eq!(received.header.id, 3);
        assert_eq!(received.payload, payload);
    }

    #[tokio::test]
    async fn test_recv_on_closed_stream_returns_eof() {
        let (client, mut server) = tokio::io::duplex(16);
        drop(client);
        let err = recv_packet(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Eof));
    }

    #[tokio::test]
    async fn test_zero_size_packet_has_empty_payload() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let header = PacketHeader::new(PacketType::Ack, 0, 0, 0);
        send_packet(&mut client, &header, None).await.unwrap();
        let received = recv_packet(&mut server).await.unwrap();
        assert!(received.payload.is_empty());
    }
}
