//! BitTorrent wire protocol module
//!
//! Implements the handshake, message framing and message types of the
//! BitTorrent peer protocol.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{Handshake, PROTOCOL_STRING, PROTOCOL_LENGTH, HANDSHAKE_LENGTH};
pub use message::{Message, MessageId};
pub use wire::{BitTorrentWire, WireProtocol, MAX_FRAME_LENGTH};
