//! rust-torrent-fetcher - Main entry point
//!
//! Downloads a single-file torrent: announce, connect, fetch pieces,
//! verify, assemble.

use anyhow::{Context, Result};
use rust_torrent_fetcher::{
    AnnounceStats, CliArgs, Command, Config, DownloadManager, DownloadStats, FileAssembler,
    Handshake, ProgressDisplay, TorrentMetadata, TorrentParser, TrackerClient,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("rust-torrent-fetcher starting");
    debug!("CLI arguments: {:?}", args);

    match &args.command {
        Command::Download { torrent_file } => {
            let config = Config::from_args(&args);
            config.validate().context("Invalid configuration")?;
            run_download(torrent_file, &config).await
        }
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

/// Load and parse the torrent file
fn load_torrent_file(path: &Path) -> Result<TorrentMetadata> {
    info!("Loading torrent file: {}", path.display());

    let metadata = TorrentParser::parse_file(path)
        .map_err(|e| {
            error!("Failed to load torrent file '{}': {}", path.display(), e);
            e
        })
        .context("Failed to load torrent file")?;

    info!("Successfully loaded torrent: {}", metadata.name);
    Ok(metadata)
}

/// Display torrent information
fn display_torrent_info(metadata: &TorrentMetadata, config: &Config) {
    if config.is_quiet() {
        return;
    }

    println!("Torrent Information:");
    println!("  Name: {}", metadata.name);
    println!(
        "  Size: {} ({})",
        metadata.total_length,
        DownloadStats::format_bytes(metadata.total_length)
    );
    println!("  Pieces: {}", metadata.total_pieces());
    println!("  Piece length: {}", DownloadStats::format_bytes(metadata.piece_length));
    println!("  Info hash: {}", metadata.info_hash_hex());
    println!("  Tracker: {}", metadata.announce);
    println!();
    println!("Configuration:");
    println!("  Output directory: {}", config.output_dir.display());
    println!("  Tracker port: {}", config.port);
    println!("  Max peers: {}", config.max_peers);
    println!();
}

/// Run the full download flow
async fn run_download(torrent_file: &Path, config: &Config) -> Result<()> {
    let metadata = load_torrent_file(torrent_file)?;
    display_torrent_info(&metadata, config);

    let our_peer_id = Handshake::generate_peer_id();

    // Ask the tracker for peers; at the start everything is still left.
    let tracker = TrackerClient::new(&metadata.announce).context("Invalid tracker URL")?;
    let announce = tracker
        .announce(
            &metadata,
            &our_peer_id,
            config.port,
            AnnounceStats {
                uploaded: 0,
                downloaded: 0,
                left: metadata.total_length,
            },
        )
        .await
        .context("Tracker announce failed")?;

    info!("Tracker returned {} peers", announce.peers.len());
    if !config.is_quiet() {
        println!("Peer list obtained:");
        for endpoint in &announce.peers {
            println!("  {}", endpoint.addr);
        }
        println!();
    }

    let mut endpoints = announce.peers;
    if endpoints.len() > config.max_peers {
        debug!("Limiting {} peers to max_peers {}", endpoints.len(), config.max_peers);
        endpoints.truncate(config.max_peers);
    }

    let metadata = Arc::new(metadata);
    let manager = Arc::new(DownloadManager::new(metadata.clone(), our_peer_id));

    let mut progress = ProgressDisplay::new(config.is_quiet());
    progress.print_status("Starting download...")?;

    let download = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run(&endpoints).await })
    };

    // Poll shared counters for the progress display while workers run.
    let mut last_downloaded = 0u64;
    let mut last_time = std::time::Instant::now();
    while !download.is_finished() {
        tokio::time::sleep(Duration::from_millis(500)).await;

        let stats = manager.stats();
        let now = std::time::Instant::now();
        let elapsed = now.duration_since(last_time).as_secs_f64();
        let download_speed = if elapsed > 0.0 {
            stats.downloaded_bytes.saturating_sub(last_downloaded) as f64 / elapsed
        } else {
            0.0
        };
        last_downloaded = stats.downloaded_bytes;
        last_time = now;

        let display = DownloadStats {
            downloaded: stats.downloaded_bytes,
            download_speed,
            peers: stats.peers_connected,
            pieces_verified: stats.pieces_verified,
            total_pieces: stats.total_pieces,
            progress: if stats.total_pieces > 0 {
                stats.pieces_verified as f64 / stats.total_pieces as f64
            } else {
                0.0
            },
        };
        progress.update(&display, metadata.total_length)?;
    }

    let result = download.await.context("Download task aborted")?;
    if let Err(e) = result {
        error!("Download failed: {}", e);
        progress.print_error(&format!("Download failed: {}", e))?;
        return Err(e);
    }

    let assembler = FileAssembler::new(config.output_dir.clone());
    let output_path = assembler
        .assemble(&metadata, &manager.piece_store())
        .await
        .map_err(|e| {
            error!("Assembly failed: {}", e);
            e
        })
        .context("Failed to assemble output file")?;

    let stats = manager.stats();
    progress.print_complete(
        &DownloadStats {
            downloaded: stats.downloaded_bytes,
            download_speed: 0.0,
            peers: 0,
            pieces_verified: stats.pieces_verified,
            total_pieces: stats.total_pieces,
            progress: 1.0,
        },
        metadata.total_length,
    )?;
    if !config.is_quiet() {
        println!("  Output: {}", output_path.display());
    }

    if stats.pieces_failed > 0 {
        warn!("{} piece attempts failed along the way", stats.pieces_failed);
    }
    info!("rust-torrent-fetcher finished");
    Ok(())
}
