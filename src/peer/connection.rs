//! Peer connection module
//!
//! Owns one TCP transport: handshake, mandatory-first-bitfield, choke
//! negotiation and pipelined block download for a single remote peer.

use std::collections::VecDeque;
use std::net::SocketAddr;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::state::{ConnectionState, Peer};
use crate::protocol::{BitTorrentWire, Handshake, Message, WireProtocol};

/// Block size requested over the wire
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Maximum outstanding block requests per connection
pub const PIPELINE_DEPTH: usize = 5;

/// Timeout for establishing the TCP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for each blocking read
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected remote peer
pub struct PeerConnection {
    /// Peer bookkeeping
    pub peer: Peer,
    /// TCP connection stream, exclusively owned
    stream: TcpStream,
    /// Wire protocol handler
    wire: BitTorrentWire,
}

impl PeerConnection {
    /// Connect to a peer, handshake, and wait for its bitfield
    ///
    /// Returns a connection in the `Ready` state, or an error if the
    /// transport, handshake or first message is not what the protocol
    /// demands. A failed connection is closed and never retried in place.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        total_pieces: usize,
    ) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                warn!("Connection timeout to {}", addr);
                TorrentError::network_error_with_address("Connection timeout", addr.to_string())
            })?
            .map_err(|e| {
                warn!("Failed to connect to {}: {}", addr, e);
                TorrentError::network_error_full("Failed to connect", addr.to_string(), e.to_string())
            })?;

        let mut peer = Peer::new(addr, total_pieces);
        peer.set_state(ConnectionState::TransportConnected);

        let mut connection = Self {
            peer,
            stream,
            wire: BitTorrentWire,
        };

        if let Err(e) = connection.establish(info_hash, our_peer_id).await {
            connection.close().await;
            return Err(e);
        }

        info!("Peer {} is ready ({} pieces advertised)", addr, connection.peer.piece_count());
        Ok(connection)
    }

    async fn establish(&mut self, info_hash: [u8; 20], our_peer_id: [u8; 20]) -> Result<()> {
        self.perform_handshake(info_hash, our_peer_id).await?;
        self.await_bitfield().await
    }

    /// Perform the BitTorrent handshake
    async fn perform_handshake(&mut self, info_hash: [u8; 20], our_peer_id: [u8; 20]) -> Result<()> {
        debug!("Sending handshake to peer: {}", self.peer.addr);
        let our_handshake = Handshake::new(info_hash, our_peer_id);
        self.wire
            .write_handshake(&mut self.stream, &our_handshake)
            .await
            .map_err(|e| {
                TorrentError::protocol_error_full(
                    "Failed to send handshake",
                    self.peer.addr.to_string(),
                    e.to_string(),
                )
            })?;
        self.peer.set_state(ConnectionState::HandshakeSent);

        debug!("Reading handshake from peer: {}", self.peer.addr);
        let peer_handshake = timeout(READ_TIMEOUT, self.wire.read_handshake(&mut self.stream))
            .await
            .map_err(|_| {
                TorrentError::protocol_error_with_peer("Handshake read timeout", self.peer.addr.to_string())
            })?
            .map_err(|e| {
                TorrentError::protocol_error_full(
                    "Failed to read handshake",
                    self.peer.addr.to_string(),
                    e.to_string(),
                )
            })?;

        if !peer_handshake.validate(&info_hash) {
            return Err(TorrentError::protocol_error_with_peer(
                "Handshake info hash mismatch",
                self.peer.addr.to_string(),
            )
            .into());
        }

        self.peer.set_peer_id(peer_handshake.peer_id);
        self.peer.set_state(ConnectionState::HandshakeVerified);
        debug!("Handshake completed with peer: {}", self.peer.addr);
        Ok(())
    }

    /// Wait for the mandatory first BITFIELD message
    async fn await_bitfield(&mut self) -> Result<()> {
        self.peer.set_state(ConnectionState::AwaitingBitfield);

        loop {
            match self.receive_message().await? {
                Message::Bitfield { bitfield } => {
                    debug!("Received bitfield ({} bytes) from peer: {}", bitfield.len(), self.peer.addr);
                    self.peer.update_bitfield(bitfield);
                    self.peer.set_state(ConnectionState::Ready);
                    return Ok(());
                }
                // Keep-alives carry no state and may precede the bitfield.
                Message::KeepAlive => continue,
                other => {
                    return Err(TorrentError::protocol_error_full(
                        "Expected BITFIELD as first message",
                        self.peer.addr.to_string(),
                        format!("got {:?}", other.message_id()),
                    )
                    .into());
                }
            }
        }
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &Message) -> Result<()> {
        trace!("Sending {:?} to peer: {}", message.message_id(), self.peer.addr);
        self.wire
            .write_message(&mut self.stream, message)
            .await
            .map_err(|e| {
                TorrentError::network_error_full(
                    "Failed to send message",
                    self.peer.addr.to_string(),
                    e.to_string(),
                )
            })?;
        Ok(())
    }

    /// Receive a message from the peer, bounded by the read timeout
    pub async fn receive_message(&mut self) -> Result<Message> {
        let message = timeout(READ_TIMEOUT, self.wire.read_message(&mut self.stream))
            .await
            .map_err(|_| {
                warn!("Read timeout from peer: {}", self.peer.addr);
                TorrentError::network_error_with_address("Read timeout", self.peer.addr.to_string())
            })?
            .map_err(|e| {
                TorrentError::network_error_full(
                    "Failed to read message",
                    self.peer.addr.to_string(),
                    e.to_string(),
                )
            })?;

        trace!("Received {:?} from peer: {}", message.message_id(), self.peer.addr);
        Ok(message)
    }

    /// Send a REQUEST for one block
    pub async fn request_block(&mut self, piece_index: u32, begin: u32, length: u32) -> Result<()> {
        trace!(
            "Requesting piece {} block at {} ({} bytes) from peer: {}",
            piece_index, begin, length, self.peer.addr
        );
        self.send_message(&Message::Request {
            index: piece_index,
            begin,
            length,
        })
        .await
    }

    /// Send INTERESTED once and block until the peer unchokes us
    async fn ensure_unchoked(&mut self) -> Result<()> {
        if !self.peer.am_interested {
            debug!("Sending Interested to peer: {}", self.peer.addr);
            self.send_message(&Message::Interested).await?;
            self.peer.am_interested = true;
        }

        while self.peer.peer_choking {
            match self.receive_message().await? {
                Message::Unchoke => {
                    debug!("Unchoked by peer: {}", self.peer.addr);
                    self.peer.peer_choking = false;
                }
                Message::Choke => self.peer.peer_choking = true,
                Message::Have { piece_index } => self.peer.mark_piece_available(piece_index as usize),
                Message::Bitfield { bitfield } => self.peer.update_bitfield(bitfield),
                Message::KeepAlive => continue,
                other => {
                    return Err(TorrentError::protocol_error_full(
                        "Unexpected message while waiting for unchoke",
                        self.peer.addr.to_string(),
                        format!("got {:?}", other.message_id()),
                    )
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Download one piece from this peer
    ///
    /// Splits the piece into 16 KiB blocks (final block truncated), keeps
    /// up to `PIPELINE_DEPTH` requests outstanding, and matches every
    /// PIECE response against an issued (index, offset) pair. A CHOKE
    /// mid-transfer invalidates outstanding requests; they are re-issued
    /// after the peer unchokes again. Any unmatched, truncated or
    /// wrong-sized block fails the whole piece.
    pub async fn download_piece(&mut self, piece_index: u32, piece_length: u32) -> Result<Vec<u8>> {
        self.ensure_unchoked().await?;

        let block_count = piece_length.div_ceil(BLOCK_SIZE) as usize;
        let block_length_at = |block: usize| -> u32 {
            let offset = block as u32 * BLOCK_SIZE;
            BLOCK_SIZE.min(piece_length - offset)
        };

        let mut buffer = vec![0u8; piece_length as usize];
        let mut received = vec![false; block_count];
        let mut received_count = 0usize;
        let mut pending: VecDeque<usize> = (0..block_count).collect();
        let mut outstanding: Vec<usize> = Vec::with_capacity(PIPELINE_DEPTH);

        debug!(
            "Downloading piece {} ({} bytes, {} blocks) from peer: {}",
            piece_index, piece_length, block_count, self.peer.addr
        );

        while received_count < block_count {
            while outstanding.len() < PIPELINE_DEPTH {
                let Some(block) = pending.pop_front() else { break };
                let begin = block as u32 * BLOCK_SIZE;
                self.request_block(piece_index, begin, block_length_at(block)).await?;
                outstanding.push(block);
            }

            match self.receive_message().await? {
                Message::Piece { index, begin, block } => {
                    if index != piece_index {
                        return Err(TorrentError::protocol_error_full(
                            "Block for wrong piece",
                            self.peer.addr.to_string(),
                            format!("expected piece {}, got {}", piece_index, index),
                        )
                        .into());
                    }
                    if begin % BLOCK_SIZE != 0 {
                        return Err(TorrentError::protocol_error_full(
                            "Block at unaligned offset",
                            self.peer.addr.to_string(),
                            format!("offset: {}", begin),
                        )
                        .into());
                    }

                    let slot = (begin / BLOCK_SIZE) as usize;
                    let position = outstanding.iter().position(|&b| b == slot);
                    if slot >= block_count || received[slot] || position.is_none() {
                        return Err(TorrentError::protocol_error_full(
                            "Unsolicited block",
                            self.peer.addr.to_string(),
                            format!("piece {}, offset {}", index, begin),
                        )
                        .into());
                    }
                    if block.len() != block_length_at(slot) as usize {
                        return Err(TorrentError::protocol_error_full(
                            "Block length mismatch",
                            self.peer.addr.to_string(),
                            format!("expected {}, got {}", block_length_at(slot), block.len()),
                        )
                        .into());
                    }

                    buffer[begin as usize..begin as usize + block.len()].copy_from_slice(&block);
                    outstanding.swap_remove(position.unwrap());
                    received[slot] = true;
                    received_count += 1;
                    trace!(
                        "Piece {} progress: {}/{} blocks from peer {}",
                        piece_index, received_count, block_count, self.peer.addr
                    );
                }
                Message::Choke => {
                    // Outstanding requests can no longer be trusted; queue
                    // them again and renegotiate before requesting more.
                    debug!("Choked mid-piece by peer {}, re-queueing {} blocks", self.peer.addr, outstanding.len());
                    self.peer.peer_choking = true;
                    let mut stalled: Vec<usize> = outstanding.drain(..).collect();
                    stalled.sort_unstable();
                    for block in stalled.into_iter().rev() {
                        pending.push_front(block);
                    }
                    self.ensure_unchoked().await?;
                }
                Message::Unchoke => self.peer.peer_choking = false,
                Message::Have { piece_index } => self.peer.mark_piece_available(piece_index as usize),
                Message::Bitfield { bitfield } => self.peer.update_bitfield(bitfield),
                Message::KeepAlive => {}
                other => {
                    trace!("Ignoring {:?} from peer {}", other.message_id(), self.peer.addr);
                }
            }
        }

        self.peer.increment_downloaded();
        debug!("Piece {} fully received from peer {}", piece_index, self.peer.addr);
        Ok(buffer)
    }

    /// Close the connection
    ///
    /// Safe on every exit path; the state drops to `Failed` and the
    /// transport is shut down.
    pub async fn close(&mut self) {
        debug!("Closing connection to peer: {}", self.peer.addr);
        self.peer.set_state(ConnectionState::Failed);
        let _ = self.stream.shutdown().await;
    }

    /// Get the peer's address
    pub fn addr(&self) -> SocketAddr {
        self.peer.addr
    }

    /// Get the remote peer's ID
    pub fn peer_id(&self) -> Option<[u8; 20]> {
        self.peer.peer_id
    }

    /// Check whether the peer advertises a piece
    pub fn has_piece(&self, piece_index: usize) -> bool {
        self.peer.has_piece(piece_index)
    }

    /// Check whether the connection is ready for requests
    pub fn is_ready(&self) -> bool {
        self.peer.state.is_ready()
    }
}
