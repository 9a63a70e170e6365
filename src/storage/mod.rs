//! Storage module
//!
//! Piece tracking and verification, download orchestration, and output
//! file assembly.

pub mod piece;
pub mod file;
pub mod download;

// Re-export piece types
pub use piece::{PieceStore, PieceStatus};

// Re-export file assembly types
pub use file::FileAssembler;

// Re-export download types
pub use download::{DownloadManager, DownloadStats, PieceEvent};
