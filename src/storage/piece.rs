//! Piece table
//!
//! Tracks per-piece status, hands out work to connections under a
//! claim/release discipline, and verifies completed buffers against their
//! expected digests.

use sha1::{Digest, Sha1};
use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::TorrentError;
use crate::torrent::TorrentMetadata;

/// Status of a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PieceStatus {
    /// Not downloaded and not claimed
    #[default]
    Missing,
    /// Claimed by exactly one connection
    InFlight,
    /// Downloaded and hash-verified
    Verified,
}

#[derive(Debug)]
struct PieceEntry {
    expected_hash: [u8; 20],
    length: u32,
    status: PieceStatus,
    buffer: Option<Vec<u8>>,
}

/// Shared piece-status table for one download
///
/// The one structure genuinely shared across connections; every status
/// transition happens under the lock, so two connections can never hold
/// the same piece.
#[derive(Debug)]
pub struct PieceStore {
    entries: Mutex<Vec<PieceEntry>>,
    total_pieces: usize,
}

impl PieceStore {
    /// Create the table from torrent metadata
    pub fn new(metadata: &TorrentMetadata) -> Self {
        let entries = metadata
            .piece_hashes
            .iter()
            .enumerate()
            .map(|(index, &expected_hash)| PieceEntry {
                expected_hash,
                length: metadata.piece_length_at(index) as u32,
                status: PieceStatus::Missing,
                buffer: None,
            })
            .collect::<Vec<_>>();

        Self {
            total_pieces: entries.len(),
            entries: Mutex::new(entries),
        }
    }

    /// Claim the next piece for download
    ///
    /// Scans indices in ascending order and flips the first eligible
    /// Missing piece to InFlight. Pieces the predicate advertises are
    /// preferred; when none matches, the first Missing piece is claimed
    /// anyway (peers in this design are assumed to hold the whole file).
    /// Returns the claimed (index, length) or None when nothing is left.
    pub async fn claim_next<F>(&self, advertised: F) -> Option<(u32, u32)>
    where
        F: Fn(usize) -> bool,
    {
        let mut entries = self.entries.lock().await;

        let mut fallback: Option<usize> = None;
        for (index, entry) in entries.iter().enumerate() {
            if entry.status != PieceStatus::Missing {
                continue;
            }
            if advertised(index) {
                entries[index].status = PieceStatus::InFlight;
                debug!("Claimed piece {} ({} bytes)", index, entries[index].length);
                return Some((index as u32, entries[index].length));
            }
            if fallback.is_none() {
                fallback = Some(index);
            }
        }

        if let Some(index) = fallback {
            entries[index].status = PieceStatus::InFlight;
            debug!("Claimed piece {} via full-seed fallback", index);
            return Some((index as u32, entries[index].length));
        }

        None
    }

    /// Return a claimed piece to the Missing pool
    pub async fn release(&self, index: u32) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(index as usize) {
            if entry.status == PieceStatus::InFlight {
                debug!("Released piece {}", index);
                entry.status = PieceStatus::Missing;
            }
        }
    }

    /// Verify a downloaded buffer and store it
    ///
    /// The buffer's SHA1 digest must equal the expected hash byte for
    /// byte. On mismatch the data is discarded, the piece reverts to
    /// Missing (eligible for another connection), and an integrity error
    /// is returned.
    pub async fn complete(&self, index: u32, data: Vec<u8>) -> Result<()> {
        let (expected_hash, expected_length) = {
            let entries = self.entries.lock().await;
            let entry = entries.get(index as usize).ok_or_else(|| {
                TorrentError::storage_error(format!("Piece index {} out of range", index))
            })?;
            (entry.expected_hash, entry.length)
        };

        let mut hasher = Sha1::new();
        hasher.update(&data);
        let digest: [u8; 20] = hasher.finalize().into();

        let mut entries = self.entries.lock().await;
        let entry = &mut entries[index as usize];

        if data.len() != expected_length as usize || digest != expected_hash {
            warn!(
                "Piece {} failed verification (expected {}, got {})",
                index,
                hex::encode(expected_hash),
                hex::encode(digest)
            );
            entry.status = PieceStatus::Missing;
            entry.buffer = None;
            return Err(TorrentError::integrity_error_for_piece("Piece hash mismatch", index).into());
        }

        entry.buffer = Some(data);
        entry.status = PieceStatus::Verified;
        debug!("Piece {} verified", index);
        Ok(())
    }

    /// Get the status of one piece
    pub async fn status(&self, index: u32) -> Option<PieceStatus> {
        let entries = self.entries.lock().await;
        entries.get(index as usize).map(|e| e.status)
    }

    /// Count verified pieces
    pub async fn verified_count(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.iter().filter(|e| e.status == PieceStatus::Verified).count()
    }

    /// Check whether every piece is verified
    pub async fn is_complete(&self) -> bool {
        let entries = self.entries.lock().await;
        entries.iter().all(|e| e.status == PieceStatus::Verified)
    }

    /// Get the number of pieces
    pub fn total_pieces(&self) -> usize {
        self.total_pieces
    }

    /// Move every verified buffer out, in index order
    ///
    /// Refuses unless all pieces are Verified; assembly is all-or-nothing.
    pub async fn take_verified(&self) -> Result<Vec<Vec<u8>>> {
        let mut entries = self.entries.lock().await;

        if let Some(index) = entries.iter().position(|e| e.status != PieceStatus::Verified) {
            return Err(TorrentError::storage_error(format!(
                "Cannot assemble: piece {} is not verified",
                index
            ))
            .into());
        }

        Ok(entries
            .iter_mut()
            .map(|e| e.buffer.take().unwrap_or_default())
            .collect())
    }
}
