//! Wire framing
//!
//! Reads and writes handshakes and length-prefixed messages over an async
//! byte stream.

use bytes::{BufMut, BytesMut};
use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::TorrentError;
use super::handshake::HANDSHAKE_LENGTH;
use super::{Handshake, Message};

/// Largest frame accepted from a remote peer
///
/// Big enough for any bitfield or 16 KiB block this client negotiates; a
/// larger length prefix is treated as a protocol violation rather than an
/// allocation request.
pub const MAX_FRAME_LENGTH: usize = 2 * 1024 * 1024;

/// WireProtocol trait for framing over a byte stream
pub trait WireProtocol {
    /// Read a complete message from the stream
    async fn read_message<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Message>;

    /// Write a message to the stream
    async fn write_message<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()>;

    /// Read a handshake from the stream
    async fn read_handshake<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Handshake>;

    /// Write a handshake to the stream
    async fn write_handshake<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()>;
}

/// Default implementation of WireProtocol
pub struct BitTorrentWire;

impl WireProtocol for BitTorrentWire {
    /// Read a complete message from the stream
    async fn read_message<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Message> {
        // Read the length prefix (4 bytes)
        let mut length_buf = [0u8; 4];
        reader.read_exact(&mut length_buf).await?;
        let length = u32::from_be_bytes(length_buf) as usize;

        // KeepAlive message has length 0
        if length == 0 {
            return Ok(Message::KeepAlive);
        }

        if length > MAX_FRAME_LENGTH {
            return Err(TorrentError::protocol_error_with_source(
                "Frame length exceeds limit",
                format!("declared {} bytes", length),
            )
            .into());
        }

        // Read the message payload
        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).await?;

        // Parse the message
        let mut full_message = BytesMut::with_capacity(4 + length);
        full_message.put_slice(&length_buf);
        full_message.put_slice(&payload);

        Message::deserialize(&full_message)
    }

    /// Write a message to the stream
    async fn write_message<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()> {
        let serialized = message.serialize();
        writer.write_all(&serialized).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read a handshake from the stream
    async fn read_handshake<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Handshake> {
        let mut buf = [0u8; HANDSHAKE_LENGTH];
        reader.read_exact(&mut buf).await?;
        Handshake::deserialize(&buf)
    }

    /// Write a handshake to the stream
    async fn write_handshake<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()> {
        let serialized = handshake.serialize();
        writer.write_all(&serialized).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_round_trip_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut wire = BitTorrentWire;

        let message = Message::Request { index: 3, begin: 16384, length: 16384 };
        wire.write_message(&mut client, &message).await.unwrap();

        let received = wire.read_message(&mut server).await.unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_keepalive_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let mut wire = BitTorrentWire;

        wire.write_message(&mut client, &Message::KeepAlive).await.unwrap();
        let received = wire.read_message(&mut server).await.unwrap();
        assert_eq!(received, Message::KeepAlive);
    }

    #[tokio::test]
    async fn test_handshake_round_trip_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let mut wire = BitTorrentWire;

        let handshake = Handshake::new([7u8; 20], [9u8; 20]);
        wire.write_handshake(&mut client, &handshake).await.unwrap();

        let received = wire.read_handshake(&mut server).await.unwrap();
        assert_eq!(received.info_hash, handshake.info_hash);
        assert_eq!(received.peer_id, handshake.peer_id);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let mut wire = BitTorrentWire;

        let hostile = ((MAX_FRAME_LENGTH + 1) as u32).to_be_bytes();
        client.write_all(&hostile).await.unwrap();

        assert!(wire.read_message(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_stream_fails() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let mut wire = BitTorrentWire;

        // Frame declares 13 bytes but the stream ends after 2.
        client.write_all(&[0, 0, 0, 13, 6, 0]).await.unwrap();
        drop(client);

        assert!(wire.read_message(&mut server).await.is_err());
    }
}
