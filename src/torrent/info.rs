//! Torrent metadata structures
//!
//! Immutable, derived view of a decoded torrent descriptor.

use sha1::{Digest, Sha1};
use anyhow::Result;

use crate::error::TorrentError;

/// High-level torrent metadata
#[derive(Debug, Clone)]
pub struct TorrentMetadata {
    /// Tracker announce URL
    pub announce: String,
    /// SHA1 hash of the bencoded info dictionary
    pub info_hash: [u8; 20],
    /// Size of each piece in bytes (constant except the final piece)
    pub piece_length: u64,
    /// Total file size in bytes
    pub total_length: u64,
    /// Expected SHA1 digest per piece, in index order
    pub piece_hashes: Vec<[u8; 20]>,
    /// Output filename
    pub name: String,
}

impl TorrentMetadata {
    /// Get the number of pieces in the torrent
    pub fn total_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Get the exact length of a piece
    ///
    /// Every piece is `piece_length` bytes except the final one, which
    /// holds whatever remains of `total_length`.
    pub fn piece_length_at(&self, index: usize) -> u64 {
        if index + 1 == self.total_pieces() {
            self.total_length - self.piece_length * (self.total_pieces() as u64 - 1)
        } else {
            self.piece_length
        }
    }

    /// Get the expected hash for a specific piece index
    pub fn piece_hash(&self, index: usize) -> Option<[u8; 20]> {
        self.piece_hashes.get(index).copied()
    }

    /// Get the info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Compute the info hash from bencoded info dictionary bytes
    pub fn compute_info_hash(info_dict_bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }

    /// Split the concatenated `pieces` field into 20-byte digests
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; 20]>> {
        if pieces_bytes.len() % 20 != 0 {
            return Err(TorrentError::format_error_with_source(
                "Pieces field length must be a multiple of 20",
                format!("got {}", pieces_bytes.len()),
            )
            .into());
        }

        let mut hashes = Vec::with_capacity(pieces_bytes.len() / 20);
        for chunk in pieces_bytes.chunks_exact(20) {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hashes.push(hash);
        }

        Ok(hashes)
    }
}
