//! Peer state module
//!
//! Tracks the lifecycle of a peer connection and per-peer bookkeeping.

use std::net::SocketAddr;

/// Lifecycle of a peer connection
///
/// A connection moves forward through these states in order; any state can
/// drop to `Failed` on an I/O error, timeout or protocol mismatch, after
/// which the transport is closed and the connection discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport yet
    #[default]
    Disconnected,
    /// TCP established, handshake not sent
    TransportConnected,
    /// Our handshake is on the wire
    HandshakeSent,
    /// Remote handshake received and validated
    HandshakeVerified,
    /// Waiting for the mandatory first BITFIELD
    AwaitingBitfield,
    /// Bitfield recorded, block requests allowed
    Ready,
    /// Dead; transport closed, never reused
    Failed,
}

impl ConnectionState {
    /// Check if the connection can serve block requests
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Check if the connection is unusable
    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed)
    }
}

/// Per-remote bookkeeping for one peer
#[derive(Debug, Clone)]
pub struct Peer {
    /// Peer address
    pub addr: SocketAddr,
    /// Remote peer identifier, learned from the handshake
    pub peer_id: Option<[u8; 20]>,
    /// Current lifecycle state
    pub state: ConnectionState,
    /// We have sent INTERESTED (latched)
    pub am_interested: bool,
    /// They're choking us
    pub peer_choking: bool,
    /// Raw bitfield bytes as received, MSB-first per byte
    pub bitfield: Option<Vec<u8>>,
    /// Total pieces in the torrent, bounds has_piece lookups
    pub total_pieces: usize,
    /// Pieces successfully downloaded from this peer
    pub pieces_downloaded: u32,
}

impl Peer {
    /// Create a new peer
    pub fn new(addr: SocketAddr, total_pieces: usize) -> Self {
        Self {
            addr,
            peer_id: None,
            state: ConnectionState::Disconnected,
            am_interested: false,
            peer_choking: true,
            bitfield: None,
            total_pieces,
            pieces_downloaded: 0,
        }
    }

    /// Record the peer's bitfield
    pub fn update_bitfield(&mut self, bitfield: Vec<u8>) {
        self.bitfield = Some(bitfield);
    }

    /// Mark a single piece as available (HAVE message)
    pub fn mark_piece_available(&mut self, piece_index: usize) {
        if piece_index >= self.total_pieces {
            return;
        }
        let bitfield = self
            .bitfield
            .get_or_insert_with(|| vec![0u8; self.total_pieces.div_ceil(8)]);
        let byte_index = piece_index / 8;
        if byte_index < bitfield.len() {
            bitfield[byte_index] |= 1 << (7 - (piece_index % 8));
        }
    }

    /// Check if the peer advertises a specific piece
    ///
    /// Bits are unpacked most-significant-bit first; out-of-range indices
    /// are simply unavailable.
    pub fn has_piece(&self, piece_index: usize) -> bool {
        if piece_index >= self.total_pieces {
            return false;
        }
        if let Some(ref bitfield) = self.bitfield {
            let byte_index = piece_index / 8;
            let bit_index = 7 - (piece_index % 8);

            if byte_index < bitfield.len() {
                return (bitfield[byte_index] >> bit_index) & 1 == 1;
            }
        }
        false
    }

    /// Check if block requests are currently allowed
    pub fn can_request(&self) -> bool {
        !self.peer_choking && self.am_interested && self.state.is_ready()
    }

    /// Set the lifecycle state
    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Set the remote peer ID
    pub fn set_peer_id(&mut self, peer_id: [u8; 20]) {
        self.peer_id = Some(peer_id);
    }

    /// Increment the downloaded-pieces counter
    pub fn increment_downloaded(&mut self) {
        self.pieces_downloaded = self.pieces_downloaded.saturating_add(1);
    }

    /// Get the number of pieces the peer advertises
    pub fn piece_count(&self) -> usize {
        if let Some(ref bitfield) = self.bitfield {
            bitfield.iter().map(|byte| byte.count_ones() as usize).sum()
        } else {
            0
        }
    }
}
