//! Output assembly
//!
//! Writes verified piece buffers to the output file in index order.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::error::TorrentError;
use crate::storage::piece::PieceStore;
use crate::torrent::TorrentMetadata;

/// Assembles verified pieces into the final output file
#[derive(Debug)]
pub struct FileAssembler {
    /// Base output directory
    output_dir: PathBuf,
}

impl FileAssembler {
    /// Create an assembler writing into the given directory
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Get the output path for a torrent
    pub fn output_path(&self, metadata: &TorrentMetadata) -> PathBuf {
        self.output_dir.join(&metadata.name)
    }

    /// Write the torrent's pieces to disk, all-or-nothing
    ///
    /// Fails without touching the filesystem if any piece is unverified.
    pub async fn assemble(&self, metadata: &TorrentMetadata, pieces: &PieceStore) -> Result<PathBuf> {
        let buffers = pieces.take_verified().await?;

        if !self.output_dir.exists() {
            debug!("Creating output directory: {}", self.output_dir.display());
            fs::create_dir_all(&self.output_dir).await.map_err(|e| {
                error!("Failed to create output directory '{}': {}", self.output_dir.display(), e);
                TorrentError::storage_error_full(
                    "Failed to create output directory",
                    self.output_dir.display().to_string(),
                    e.to_string(),
                )
            })?;
        }

        let path = self.output_path(metadata);
        info!("Assembling {} pieces into {}", buffers.len(), path.display());

        let mut file = fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create output file '{}': {}", path.display(), e);
            TorrentError::storage_error_full(
                "Failed to create output file",
                path.display().to_string(),
                e.to_string(),
            )
        })?;

        for buffer in &buffers {
            file.write_all(buffer).await.map_err(|e| {
                TorrentError::storage_error_full(
                    "Failed to write piece data",
                    path.display().to_string(),
                    e.to_string(),
                )
            })?;
        }
        file.flush().await.map_err(|e| {
            TorrentError::storage_error_full(
                "Failed to flush output file",
                path.display().to_string(),
                e.to_string(),
            )
        })?;

        info!("File assembled successfully: {}", path.display());
        Ok(path)
    }

    /// Get the base output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
