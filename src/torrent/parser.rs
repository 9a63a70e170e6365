//! Torrent descriptor parser
//!
//! Decodes .torrent files and extracts the metadata the engine needs.

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::bencode::{decode, encode, BencodeValue};
use crate::error::TorrentError;
use crate::torrent::info::TorrentMetadata;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent descriptor from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentMetadata> {
        info!("Parsing torrent descriptor from {} bytes", data.len());

        let (root, consumed) = decode(data).map_err(|e| {
            error!("Failed to decode torrent descriptor: {}", e);
            e
        })?;
        if consumed != data.len() {
            warn!("Descriptor has {} trailing bytes past the root value", data.len() - consumed);
        }

        Self::convert_to_metadata(root)
    }

    /// Parse a .torrent descriptor from a file path
    pub fn parse_file(path: &std::path::Path) -> Result<TorrentMetadata> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full(
                "Failed to read torrent file",
                path.display().to_string(),
                e.to_string(),
            )
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    fn convert_to_metadata(root: BencodeValue) -> Result<TorrentMetadata> {
        if root.as_dict().is_none() {
            return Err(TorrentError::format_error("Descriptor root must be a dictionary").into());
        }

        let announce = root
            .get(b"announce")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TorrentError::format_error("Missing announce URL"))?
            .to_string();

        let info_value = root
            .get(b"info")
            .filter(|v| v.as_dict().is_some())
            .ok_or_else(|| TorrentError::format_error("Missing info dictionary"))?;

        let piece_length = info_value
            .get(b"piece length")
            .and_then(|v| v.as_int())
            .filter(|&len| len > 0)
            .ok_or_else(|| TorrentError::format_error("Missing or invalid piece length"))?
            as u64;

        let pieces_bytes = info_value
            .get(b"pieces")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| TorrentError::format_error("Missing pieces field"))?;
        let piece_hashes = TorrentMetadata::parse_piece_hashes(pieces_bytes)?;

        let name = info_value
            .get(b"name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TorrentError::format_error("Missing name field"))?
            .to_string();

        if info_value.get(b"files").is_some() {
            return Err(TorrentError::format_error("Multi-file torrents are not supported").into());
        }

        let total_length = info_value
            .get(b"length")
            .and_then(|v| v.as_int())
            .filter(|&len| len >= 0)
            .ok_or_else(|| TorrentError::format_error("Missing or invalid length field"))?
            as u64;

        // ceil(total / piece_length) must match the digest count.
        let expected_pieces = total_length.div_ceil(piece_length);
        if expected_pieces != piece_hashes.len() as u64 {
            return Err(TorrentError::format_error_with_source(
                "Piece count does not match total length",
                format!("expected {}, descriptor has {}", expected_pieces, piece_hashes.len()),
            )
            .into());
        }

        // The info hash covers the re-encoded info dictionary; the codec
        // keeps key order, so this is byte-identical to the input slice.
        let info_hash = TorrentMetadata::compute_info_hash(&encode(info_value));

        info!("Parsed torrent descriptor: {} ({} pieces)", name, piece_hashes.len());
        Ok(TorrentMetadata {
            announce,
            info_hash,
            piece_length,
            total_length,
            piece_hashes,
            name,
        })
    }
}
