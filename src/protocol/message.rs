//! BitTorrent protocol messages
//!
//! Defines the message types exchanged after the handshake and their
//! frame (de)serialization.

use bytes::{Buf, BufMut, BytesMut};
use anyhow::Result;
use tracing::trace;

use crate::error::TorrentError;

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(TorrentError::protocol_error_with_source(
                "Invalid message ID",
                format!("value: {}", value),
            )
            .into()),
        }
    }
}

/// BitTorrent protocol message
///
/// Frame layout: `<4-byte big-endian length><1-byte id><payload>`, where
/// the length counts the id byte plus payload. A zero length is a
/// keep-alive with no id or payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::KeepAlive => None,
        }
    }

    /// Get the frame length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
        }
    }

    /// Serialize the message to bytes (including the length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing message: {:?}", self.message_id());
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);

        buf.put_u32(self.length());

        match self {
            Message::KeepAlive => {
                // No message ID for KeepAlive
            }
            Message::Choke => buf.put_u8(MessageId::Choke as u8),
            Message::Unchoke => buf.put_u8(MessageId::Unchoke as u8),
            Message::Interested => buf.put_u8(MessageId::Interested as u8),
            Message::NotInterested => buf.put_u8(MessageId::NotInterested as u8),
            Message::Have { piece_index } => {
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece_index);
            }
            Message::Bitfield { bitfield } => {
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bitfield);
            }
            Message::Request { index, begin, length } => {
                buf.put_u8(MessageId::Request as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            Message::Cancel { index, begin, length } => {
                buf.put_u8(MessageId::Cancel as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
        }

        buf.to_vec()
    }

    /// Deserialize a message from bytes (including the length prefix)
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut buf = BytesMut::from(data);

        if buf.remaining() < 4 {
            return Err(TorrentError::protocol_error("Message frame too short").into());
        }

        let length = buf.get_u32() as usize;

        // KeepAlive has length 0 and no message ID.
        if length == 0 {
            return Ok(Message::KeepAlive);
        }

        if buf.remaining() < length {
            return Err(TorrentError::protocol_error_with_source(
                "Truncated message frame",
                format!("declared {} bytes, got {}", length, buf.remaining()),
            )
            .into());
        }

        let id = buf.get_u8();
        let message_id = MessageId::try_from(id)?;
        trace!("Deserializing {:?} message ({} bytes)", message_id, length);

        match message_id {
            MessageId::Choke => Ok(Message::Choke),
            MessageId::Unchoke => Ok(Message::Unchoke),
            MessageId::Interested => Ok(Message::Interested),
            MessageId::NotInterested => Ok(Message::NotInterested),
            MessageId::Have => {
                if buf.remaining() < 4 {
                    return Err(TorrentError::protocol_error_with_source(
                        "Have message too short",
                        format!("expected 4 bytes, got {}", buf.remaining()),
                    )
                    .into());
                }
                Ok(Message::Have { piece_index: buf.get_u32() })
            }
            MessageId::Bitfield => Ok(Message::Bitfield { bitfield: buf.to_vec() }),
            MessageId::Request => {
                if buf.remaining() < 12 {
                    return Err(TorrentError::protocol_error_with_source(
                        "Request message too short",
                        format!("expected 12 bytes, got {}", buf.remaining()),
                    )
                    .into());
                }
                Ok(Message::Request {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                })
            }
            MessageId::Piece => {
                if buf.remaining() < 8 {
                    return Err(TorrentError::protocol_error_with_source(
                        "Piece message too short",
                        format!("expected at least 8 bytes, got {}", buf.remaining()),
                    )
                    .into());
                }
                Ok(Message::Piece {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    block: buf.to_vec(),
                })
            }
            MessageId::Cancel => {
                if buf.remaining() < 12 {
                    return Err(TorrentError::protocol_error_with_source(
                        "Cancel message too short",
                        format!("expected 12 bytes, got {}", buf.remaining()),
                    )
                    .into());
                }
                Ok(Message::Cancel {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_codes() {
        assert_eq!(MessageId::Choke as u8, 0);
        assert_eq!(MessageId::Unchoke as u8, 1);
        assert_eq!(MessageId::Interested as u8, 2);
        assert_eq!(MessageId::NotInterested as u8, 3);
        assert_eq!(MessageId::Have as u8, 4);
        assert_eq!(MessageId::Bitfield as u8, 5);
        assert_eq!(MessageId::Request as u8, 6);
        assert_eq!(MessageId::Piece as u8, 7);
        assert_eq!(MessageId::Cancel as u8, 8);
    }

    #[test]
    fn test_message_id_from_u8() {
        assert_eq!(MessageId::try_from(0).unwrap(), MessageId::Choke);
        assert_eq!(MessageId::try_from(8).unwrap(), MessageId::Cancel);
        assert!(MessageId::try_from(9).is_err());
        assert!(MessageId::try_from(255).is_err());
    }

    #[test]
    fn test_keepalive_frame() {
        let message = Message::KeepAlive;
        let serialized = message.serialize();
        assert_eq!(serialized, vec![0, 0, 0, 0]);
        assert_eq!(Message::deserialize(&serialized).unwrap(), Message::KeepAlive);
    }

    #[test]
    fn test_request_frame_layout() {
        let message = Message::Request { index: 1, begin: 0x4000, length: 0x4000 };
        let serialized = message.serialize();

        assert_eq!(serialized.len(), 17);
        assert_eq!(&serialized[0..4], &[0, 0, 0, 13]);
        assert_eq!(serialized[4], 6);
        assert_eq!(&serialized[5..9], &[0, 0, 0, 1]);
        assert_eq!(&serialized[9..13], &[0, 0, 0x40, 0]);
        assert_eq!(&serialized[13..17], &[0, 0, 0x40, 0]);

        assert_eq!(Message::deserialize(&serialized).unwrap(), message);
    }

    #[test]
    fn test_piece_round_trip() {
        let message = Message::Piece { index: 10, begin: 0, block: vec![1, 2, 3, 4, 5] };
        let deserialized = Message::deserialize(&message.serialize()).unwrap();
        assert_eq!(deserialized, message);
    }

    #[test]
    fn test_piece_payload_too_short() {
        // length 5: id + only 4 payload bytes, below the 8-byte minimum
        let frame = vec![0, 0, 0, 5, 7, 0, 0, 0, 1];
        assert!(Message::deserialize(&frame).is_err());
    }

    #[test]
    fn test_bitfield_round_trip() {
        let message = Message::Bitfield { bitfield: vec![0b1010_0000, 0b0000_0001] };
        let deserialized = Message::deserialize(&message.serialize()).unwrap();
        assert_eq!(deserialized, message);
    }

    #[test]
    fn test_have_round_trip() {
        let message = Message::Have { piece_index: 42 };
        assert_eq!(Message::deserialize(&message.serialize()).unwrap(), message);
    }

    #[test]
    fn test_cancel_round_trip() {
        let message = Message::Cancel { index: 1, begin: 2, length: 3 };
        assert_eq!(Message::deserialize(&message.serialize()).unwrap(), message);
    }

    #[test]
    fn test_truncated_frame() {
        // Declares 13 bytes but carries only the id.
        let frame = vec![0, 0, 0, 13, 6];
        assert!(Message::deserialize(&frame).is_err());
    }

    #[test]
    fn test_message_length() {
        assert_eq!(Message::KeepAlive.length(), 0);
        assert_eq!(Message::Choke.length(), 1);
        assert_eq!(Message::Have { piece_index: 0 }.length(), 5);
        assert_eq!(Message::Request { index: 0, begin: 0, length: 0 }.length(), 13);
        assert_eq!(Message::Piece { index: 0, begin: 0, block: vec![1, 2, 3] }.length(), 12);
    }
}
