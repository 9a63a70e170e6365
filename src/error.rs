//! Error types for the torrent fetcher
//!
//! This module defines the error taxonomy shared by all components:
//! format, network, protocol, integrity and storage failures.

use std::fmt;

/// Comprehensive error type for torrent operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Malformed bencode or missing descriptor fields
    Format {
        message: String,
        source: Option<String>,
    },

    /// Tracker unreachable, no peers, connection refused or timed out
    Network {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Wire-protocol violations: bad handshake, truncated frame, bad payload
    Protocol {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Piece hash mismatch
    Integrity {
        message: String,
        piece: Option<u32>,
    },

    /// File I/O and output assembly errors
    Storage {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },
}

impl TorrentError {
    /// Create a new Format error
    pub fn format_error(message: impl Into<String>) -> Self {
        TorrentError::Format {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Format error with source
    pub fn format_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Format {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new Network error
    pub fn network_error(message: impl Into<String>) -> Self {
        TorrentError::Network {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new Network error with address
    pub fn network_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        TorrentError::Network {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new Network error with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Network {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new Protocol error
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::Protocol {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new Protocol error with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Protocol {
            message: message.into(),
            peer: None,
            source: Some(source.into()),
        }
    }

    /// Create a new Protocol error with peer address
    pub fn protocol_error_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::Protocol {
            message: message.into(),
            peer: Some(peer.into()),
            source: None,
        }
    }

    /// Create a new Protocol error with peer and source
    pub fn protocol_error_full(message: impl Into<String>, peer: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Protocol {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new Integrity error
    pub fn integrity_error(message: impl Into<String>) -> Self {
        TorrentError::Integrity {
            message: message.into(),
            piece: None,
        }
    }

    /// Create a new Integrity error for a piece index
    pub fn integrity_error_for_piece(message: impl Into<String>, piece: u32) -> Self {
        TorrentError::Integrity {
            message: message.into(),
            piece: Some(piece),
        }
    }

    /// Create a new Storage error
    pub fn storage_error(message: impl Into<String>) -> Self {
        TorrentError::Storage {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new Storage error with path
    pub fn storage_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        TorrentError::Storage {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a new Storage error with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Storage {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Check whether this is an integrity failure
    pub fn is_integrity(&self) -> bool {
        matches!(self, TorrentError::Integrity { .. })
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::Format { message, source } => {
                if let Some(src) = source {
                    write!(f, "Format error: {} (source: {})", message, src)
                } else {
                    write!(f, "Format error: {}", message)
                }
            }
            TorrentError::Network { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            TorrentError::Protocol { message, peer, source } => {
                match (peer, source) {
                    (Some(p), Some(s)) => write!(f, "Protocol error: {} (peer: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Protocol error: {} (peer: {})", message, p),
                    (None, Some(s)) => write!(f, "Protocol error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Protocol error: {}", message),
                }
            }
            TorrentError::Integrity { message, piece } => {
                if let Some(idx) = piece {
                    write!(f, "Integrity error: {} (piece: {})", message, idx)
                } else {
                    write!(f, "Integrity error: {}", message)
                }
            }
            TorrentError::Storage { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
        }
    }
}

impl std::error::Error for TorrentError {}

// Implement From traits for common error types

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::network_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TorrentError::network_error("Operation timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        let err = TorrentError::format_error("Invalid torrent file");
        assert_eq!(err.to_string(), "Format error: Invalid torrent file");
    }

    #[test]
    fn test_format_error_with_source() {
        let err = TorrentError::format_error_with_source("Invalid torrent file", "unterminated list");
        assert!(err.to_string().contains("Format error"));
        assert!(err.to_string().contains("Invalid torrent file"));
        assert!(err.to_string().contains("unterminated list"));
    }

    #[test]
    fn test_protocol_error_with_peer() {
        let err = TorrentError::protocol_error_with_peer("Handshake failed", "127.0.0.1:6881");
        assert!(err.to_string().contains("Protocol error"));
        assert!(err.to_string().contains("Handshake failed"));
        assert!(err.to_string().contains("127.0.0.1:6881"));
    }

    #[test]
    fn test_integrity_error_for_piece() {
        let err = TorrentError::integrity_error_for_piece("Hash mismatch", 7);
        assert!(err.to_string().contains("Integrity error"));
        assert!(err.to_string().contains("piece: 7"));
        assert!(err.is_integrity());
    }

    #[test]
    fn test_storage_error_with_path() {
        let err = TorrentError::storage_error_with_path("File not found", "/path/to/file");
        assert!(err.to_string().contains("Storage error"));
        assert!(err.to_string().contains("File not found"));
        assert!(err.to_string().contains("/path/to/file"));
    }

    #[test]
    fn test_network_error_with_address() {
        let err = TorrentError::network_error_with_address("Connection refused", "10.0.0.1:51413");
        assert!(err.to_string().contains("Network error"));
        assert!(err.to_string().contains("10.0.0.1:51413"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: TorrentError = io_err.into();
        assert!(matches!(err, TorrentError::Network { .. }));
    }

    #[test]
    fn test_is_integrity() {
        assert!(!TorrentError::network_error("x").is_integrity());
        assert!(TorrentError::integrity_error("x").is_integrity());
    }
}
