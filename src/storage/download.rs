//! Download orchestrator
//!
//! Owns the connection set, drives the claim/download/verify loop across
//! per-peer worker tasks, and decides whether the whole download succeeded.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TorrentError;
use crate::peer::PeerConnection;
use crate::storage::piece::PieceStore;
use crate::torrent::TorrentMetadata;
use crate::tracker::PeerEndpoint;

/// Completion events reported by workers
#[derive(Debug, Clone)]
pub enum PieceEvent {
    /// A piece passed verification
    Verified { index: u32, peer: SocketAddr },
    /// A piece attempt failed; the piece is back in the Missing pool
    Failed { index: u32, peer: SocketAddr, reason: String },
}

/// Snapshot of download progress
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    /// Total block bytes received
    pub downloaded_bytes: u64,
    /// Pieces verified so far
    pub pieces_verified: usize,
    /// Failed piece attempts (verification or connection)
    pub pieces_failed: usize,
    /// Workers still running
    pub peers_connected: usize,
    /// Total pieces in the torrent
    pub total_pieces: usize,
}

#[derive(Debug, Default)]
struct StatsInner {
    downloaded_bytes: AtomicU64,
    pieces_verified: AtomicUsize,
    pieces_failed: AtomicUsize,
    peers_connected: AtomicUsize,
}

/// Orchestrates one complete download
pub struct DownloadManager {
    /// Torrent metadata, owned for the lifetime of the download
    metadata: Arc<TorrentMetadata>,
    /// Shared piece-status table
    pieces: Arc<PieceStore>,
    /// Our peer ID, sent in every handshake
    our_peer_id: [u8; 20],
    /// Shared progress counters
    stats: Arc<StatsInner>,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new(metadata: Arc<TorrentMetadata>, our_peer_id: [u8; 20]) -> Self {
        info!("Creating download manager for: {}", metadata.name);
        let pieces = Arc::new(PieceStore::new(&metadata));
        Self {
            metadata,
            pieces,
            our_peer_id,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Get the shared piece table
    pub fn piece_store(&self) -> Arc<PieceStore> {
        self.pieces.clone()
    }

    /// Snapshot the current progress counters
    pub fn stats(&self) -> DownloadStats {
        DownloadStats {
            downloaded_bytes: self.stats.downloaded_bytes.load(Ordering::Relaxed),
            pieces_verified: self.stats.pieces_verified.load(Ordering::Relaxed),
            pieces_failed: self.stats.pieces_failed.load(Ordering::Relaxed),
            peers_connected: self.stats.peers_connected.load(Ordering::Relaxed),
            total_pieces: self.metadata.total_pieces(),
        }
    }

    /// Drive the download to completion
    ///
    /// Connects to every endpoint, runs one worker per Ready connection,
    /// and returns once every piece is Verified. Any piece left
    /// unverified after all workers retire fails the download as a whole;
    /// there is no partial-success output.
    pub async fn run(&self, endpoints: &[PeerEndpoint]) -> Result<()> {
        if endpoints.is_empty() {
            return Err(TorrentError::network_error("Tracker returned no peers").into());
        }

        info!("Connecting to {} peers", endpoints.len());
        let total_pieces = self.metadata.total_pieces();

        let mut connect_handles = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let addr = endpoint.addr;
            let info_hash = self.metadata.info_hash;
            let our_peer_id = self.our_peer_id;
            connect_handles.push(tokio::spawn(async move {
                PeerConnection::connect(addr, info_hash, our_peer_id, total_pieces).await
            }));
        }

        let mut connections = Vec::new();
        for handle in connect_handles {
            match handle.await {
                Ok(Ok(connection)) => connections.push(connection),
                Ok(Err(e)) => warn!("Peer connection failed: {}", e),
                Err(e) => warn!("Peer connect task aborted: {}", e),
            }
        }

        if connections.is_empty() {
            return Err(TorrentError::network_error("No peers reachable").into());
        }
        info!("{} of {} peers ready", connections.len(), endpoints.len());
        self.stats.peers_connected.store(connections.len(), Ordering::Relaxed);

        let (tx, mut rx) = mpsc::channel::<PieceEvent>(32);
        let mut workers = Vec::with_capacity(connections.len());
        for connection in connections {
            workers.push(tokio::spawn(Self::run_worker(
                connection,
                self.pieces.clone(),
                self.stats.clone(),
                tx.clone(),
            )));
        }
        drop(tx);

        // The channel drains until every worker has retired.
        while let Some(event) = rx.recv().await {
            match event {
                PieceEvent::Verified { index, peer } => {
                    debug!("Piece {} verified (from {})", index, peer);
                }
                PieceEvent::Failed { index, peer, reason } => {
                    warn!("Piece {} failed via {}: {}", index, peer, reason);
                }
            }
        }
        for worker in workers {
            let _ = worker.await;
        }

        let verified = self.pieces.verified_count().await;
        if verified == total_pieces {
            info!("All {} pieces verified", total_pieces);
            Ok(())
        } else {
            Err(TorrentError::network_error(format!(
                "Download incomplete: {} of {} pieces verified and no eligible peers remain",
                verified, total_pieces
            ))
            .into())
        }
    }

    /// Worker loop for one connection
    ///
    /// Claims pieces the peer advertises (with the full-seed fallback),
    /// downloads and verifies them, and retires on the first connection or
    /// integrity failure. The transport is closed on every exit path.
    async fn run_worker(
        mut connection: PeerConnection,
        pieces: Arc<PieceStore>,
        stats: Arc<StatsInner>,
        tx: mpsc::Sender<PieceEvent>,
    ) {
        let peer_addr = connection.addr();

        loop {
            let Some((index, length)) = pieces.claim_next(|i| connection.has_piece(i)).await else {
                debug!("No claimable pieces left for peer {}", peer_addr);
                break;
            };

            match connection.download_piece(index, length).await {
                Ok(data) => {
                    stats.downloaded_bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
                    match pieces.complete(index, data).await {
                        Ok(()) => {
                            stats.pieces_verified.fetch_add(1, Ordering::Relaxed);
                            let _ = tx
                                .send(PieceEvent::Verified { index, peer: peer_addr })
                                .await;
                        }
                        Err(e) => {
                            // The piece is already back in the Missing
                            // pool; a peer that served bad data is not
                            // given another chance.
                            stats.pieces_failed.fetch_add(1, Ordering::Relaxed);
                            let _ = tx
                                .send(PieceEvent::Failed {
                                    index,
                                    peer: peer_addr,
                                    reason: e.to_string(),
                                })
                                .await;
                            break;
                        }
                    }
                }
                Err(e) => {
                    pieces.release(index).await;
                    stats.pieces_failed.fetch_add(1, Ordering::Relaxed);
                    let _ = tx
                        .send(PieceEvent::Failed {
                            index,
                            peer: peer_addr,
                            reason: e.to_string(),
                        })
                        .await;
                    break;
                }
            }
        }

        connection.close().await;
        stats.peers_connected.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BitTorrentWire, Handshake, Message, WireProtocol};
    use crate::storage::FileAssembler;
    use sha1::{Digest, Sha1};
    use std::path::PathBuf;
    use tokio::net::TcpListener;

    fn sha1_of(data: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    fn metadata_for(file_data: &[u8], piece_length: u64) -> Arc<TorrentMetadata> {
        Arc::new(TorrentMetadata {
            announce: "http://tracker.example.com/announce".to_string(),
            info_hash: [0x42; 20],
            piece_length,
            total_length: file_data.len() as u64,
            piece_hashes: file_data.chunks(piece_length as usize).map(sha1_of).collect(),
            name: "downloaded.bin".to_string(),
        })
    }

    /// A scripted seed holding the complete file.
    async fn run_full_seed(listener: TcpListener, metadata: Arc<TorrentMetadata>, file_data: Vec<u8>, corrupt: bool) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut wire = BitTorrentWire;

        let theirs = wire.read_handshake(&mut socket).await.unwrap();
        wire.write_handshake(&mut socket, &Handshake::new(theirs.info_hash, [0x77; 20]))
            .await
            .unwrap();

        let mut bitfield = vec![0u8; metadata.total_pieces().div_ceil(8)];
        for i in 0..metadata.total_pieces() {
            bitfield[i / 8] |= 1 << (7 - (i % 8));
        }
        wire.write_message(&mut socket, &Message::Bitfield { bitfield })
            .await
            .unwrap();

        loop {
            let msg = match wire.read_message(&mut socket).await {
                Ok(msg) => msg,
                Err(_) => return,
            };
            match msg {
                Message::Interested => {
                    wire.write_message(&mut socket, &Message::Unchoke).await.unwrap();
                }
                Message::Request { index, begin, length } => {
                    let start = index as usize * metadata.piece_length as usize + begin as usize;
                    let mut block = file_data[start..start + length as usize].to_vec();
                    if corrupt {
                        block[0] ^= 0xff;
                    }
                    if wire
                        .write_message(&mut socket, &Message::Piece { index, begin, block })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    async fn spawn_full_seed(metadata: Arc<TorrentMetadata>, file_data: Vec<u8>, corrupt: bool) -> PeerEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_full_seed(listener, metadata, file_data, corrupt));
        PeerEndpoint { addr, peer_id: None }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rust-torrent-fetcher-dl-{}-{}", tag, std::process::id()))
    }

    #[tokio::test]
    async fn test_end_to_end_two_pieces() {
        let piece_length = 1024u64;
        let file_data: Vec<u8> = (0..1536u32).map(|i| (i * 31 % 256) as u8).collect();
        let metadata = metadata_for(&file_data, piece_length);
        assert_eq!(metadata.total_pieces(), 2);

        let endpoint = spawn_full_seed(metadata.clone(), file_data.clone(), false).await;
        let manager = DownloadManager::new(metadata.clone(), Handshake::generate_peer_id());

        manager.run(&[endpoint]).await.unwrap();

        let stats = manager.stats();
        assert_eq!(stats.pieces_verified, 2);
        assert_eq!(stats.downloaded_bytes, file_data.len() as u64);

        let dir = temp_dir("e2e");
        let assembler = FileAssembler::new(&dir);
        let path = assembler.assemble(&metadata, &manager.piece_store()).await.unwrap();

        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written.len() as u64, metadata.total_length);

        // The assembled file re-hashes to the descriptor's pieces field.
        let rehashed: Vec<[u8; 20]> = written.chunks(piece_length as usize).map(sha1_of).collect();
        assert_eq!(rehashed, metadata.piece_hashes);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_work_shared_across_two_seeds() {
        let piece_length = 512u64;
        let file_data: Vec<u8> = (0..2048u32).map(|i| (i * 7 % 256) as u8).collect();
        let metadata = metadata_for(&file_data, piece_length);
        assert_eq!(metadata.total_pieces(), 4);

        let first = spawn_full_seed(metadata.clone(), file_data.clone(), false).await;
        let second = spawn_full_seed(metadata.clone(), file_data.clone(), false).await;

        let manager = DownloadManager::new(metadata.clone(), Handshake::generate_peer_id());
        manager.run(&[first, second]).await.unwrap();

        assert!(manager.piece_store().is_complete().await);
        assert_eq!(manager.stats().pieces_verified, 4);
    }

    #[tokio::test]
    async fn test_no_reachable_peers_fails() {
        let file_data = vec![0u8; 256];
        let metadata = metadata_for(&file_data, 256);

        // Grab a port that nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let manager = DownloadManager::new(metadata, Handshake::generate_peer_id());
        let result = manager
            .run(&[PeerEndpoint { addr, peer_id: None }])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_endpoint_list_fails() {
        let file_data = vec![0u8; 256];
        let metadata = metadata_for(&file_data, 256);
        let manager = DownloadManager::new(metadata, Handshake::generate_peer_id());
        assert!(manager.run(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupting_seed_fails_download() {
        let piece_length = 512u64;
        let file_data: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
        let metadata = metadata_for(&file_data, piece_length);

        let endpoint = spawn_full_seed(metadata.clone(), file_data, true).await;
        let manager = DownloadManager::new(metadata.clone(), Handshake::generate_peer_id());

        let result = manager.run(&[endpoint]).await;
        assert!(result.is_err());

        // The bad piece reverted to Missing; nothing was marked verified.
        assert!(!manager.piece_store().is_complete().await);
        assert_eq!(manager.stats().pieces_verified, 0);
        assert!(manager.stats().pieces_failed > 0);
    }
}
