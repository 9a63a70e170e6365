//! rust-torrent-fetcher
//!
//! A BitTorrent piece-acquisition engine: bencode codec, peer wire
//! protocol, verified piece download and single-file assembly.

pub mod bencode;
pub mod torrent;
pub mod protocol;
pub mod peer;
pub mod tracker;
pub mod storage;
pub mod cli;
pub mod error;

pub use error::TorrentError;

pub use bencode::{BencodeValue, decode, encode};
pub use torrent::{TorrentParser, TorrentMetadata};
pub use protocol::{Handshake, Message, MessageId};
pub use peer::{PeerConnection, Peer, ConnectionState};
pub use tracker::{TrackerClient, AnnounceResponse, AnnounceStats, PeerEndpoint};
pub use storage::{
    PieceStore, PieceStatus, FileAssembler, DownloadManager, PieceEvent,
    DownloadStats as StorageDownloadStats,
};
pub use cli::{CliArgs, Command, Config, ProgressDisplay, DownloadStats};
