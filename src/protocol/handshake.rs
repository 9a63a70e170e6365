//! BitTorrent handshake protocol
//!
//! Handles the fixed 68-byte handshake exchanged before any messages.

use bytes::{BufMut, BytesMut};
use anyhow::Result;
use tracing::{debug, info, trace, warn};

use crate::error::TorrentError;

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Total length of a serialized handshake
pub const HANDSHAKE_LENGTH: usize = 68;

/// BitTorrent handshake message
///
/// Layout: 1 length byte, 19 protocol bytes, 8 reserved zero bytes,
/// 20-byte info hash, 20-byte peer id.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Protocol identifier (19 bytes)
    pub protocol_id: [u8; 19],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with info_hash and peer_id
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating handshake for info_hash: {}", hex::encode(info_hash));
        Self {
            protocol_id: PROTOCOL_STRING.as_bytes().try_into().unwrap(),
            info_hash,
            peer_id,
        }
    }

    /// Generate a random peer ID with the "-RF" client prefix
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[0..3].copy_from_slice(b"-RF");
        peer_id[3..8].copy_from_slice(b"0001-");
        peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
        info!("Generated new peer ID: {}", hex::encode(peer_id));
        peer_id
    }

    /// Serialize the handshake to its 68-byte wire form
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing handshake");
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LENGTH);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(&self.protocol_id);
        buf.put_slice(&[0u8; 8]); // Reserved bytes
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.to_vec()
    }

    /// Deserialize a handshake from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        trace!("Deserializing handshake from {} bytes", data.len());

        if data.len() < HANDSHAKE_LENGTH {
            return Err(TorrentError::protocol_error_with_source(
                "Handshake data too short",
                format!("expected {} bytes, got {}", HANDSHAKE_LENGTH, data.len()),
            )
            .into());
        }

        let protocol_length = data[0];
        if protocol_length != PROTOCOL_LENGTH {
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol length",
                format!("expected {}, got {}", PROTOCOL_LENGTH, protocol_length),
            )
            .into());
        }

        let protocol_id: [u8; 19] = data[1..20].try_into().unwrap();
        if protocol_id != PROTOCOL_STRING.as_bytes() {
            return Err(TorrentError::protocol_error("Invalid protocol string").into());
        }

        // Bytes 20..28 are reserved and ignored.
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);
        debug!("Deserialized handshake from peer {}", hex::encode(peer_id));

        Ok(Self {
            protocol_id,
            info_hash,
            peer_id,
        })
    }

    /// Validate the handshake protocol string and info hash
    ///
    /// The received info hash must equal the locally computed one; a
    /// mismatch is never repaired, only rejected.
    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> bool {
        if self.protocol_id != PROTOCOL_STRING.as_bytes() {
            warn!("Handshake validation failed: invalid protocol identifier");
            return false;
        }

        if self.info_hash != *expected_info_hash {
            warn!("Handshake validation failed: info hash mismatch");
            warn!("  Expected: {}", hex::encode(expected_info_hash));
            warn!("  Got:      {}", hex::encode(self.info_hash));
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_byte_layout() {
        let info_hash = [0xabu8; 20];
        let peer_id = [0xcdu8; 20];
        let bytes = Handshake::new(info_hash, peer_id).serialize();

        assert_eq!(bytes.len(), 68);
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], PROTOCOL_STRING.as_bytes());
        assert_eq!(&bytes[20..28], &[0u8; 8]);
        assert_eq!(&bytes[28..48], &info_hash);
        assert_eq!(&bytes[48..68], &peer_id);
    }

    #[test]
    fn test_handshake_serialize_deserialize() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        let deserialized = Handshake::deserialize(&handshake.serialize()).unwrap();

        assert_eq!(deserialized.protocol_id, handshake.protocol_id);
        assert_eq!(deserialized.info_hash, handshake.info_hash);
        assert_eq!(deserialized.peer_id, handshake.peer_id);
    }

    #[test]
    fn test_handshake_too_short() {
        assert!(Handshake::deserialize(&[19u8; 67]).is_err());
    }

    #[test]
    fn test_handshake_bad_protocol() {
        let mut bytes = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        bytes[5] ^= 0xff;
        assert!(Handshake::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_generate_peer_id() {
        let peer_id = Handshake::generate_peer_id();
        assert_eq!(&peer_id[0..3], b"-RF");
        assert_eq!(peer_id.len(), 20);
    }

    #[test]
    fn test_handshake_validate_rejects_wrong_hash() {
        let info_hash = [1u8; 20];
        let handshake = Handshake::new(info_hash, [2u8; 20]);

        assert!(handshake.validate(&info_hash));

        let mut wrong = info_hash;
        wrong[10] ^= 0x01;
        assert!(!handshake.validate(&wrong));
    }
}
