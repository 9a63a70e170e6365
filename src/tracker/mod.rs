//! Tracker client module
//!
//! Builds the announce request and parses the bencoded response into peer
//! endpoints.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::bencode::{decode, BencodeValue};
use crate::error::TorrentError;
use crate::torrent::TorrentMetadata;

/// Timeout for the announce HTTP exchange
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A peer endpoint returned by the tracker
///
/// The peer ID is only present in non-compact responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    /// Socket address of the peer
    pub addr: SocketAddr,
    /// The peer's 20-byte ID, when the tracker provides one
    pub peer_id: Option<[u8; 20]>,
}

/// Transfer totals reported to the tracker
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnounceStats {
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

/// Parsed tracker announce response
#[derive(Debug, Clone, Default)]
pub struct AnnounceResponse {
    /// Seconds to wait between announces, if the tracker says
    pub interval: Option<i64>,
    /// Lower bound on the announce interval
    pub min_interval: Option<i64>,
    /// Number of seeders, if reported
    pub complete: Option<i64>,
    /// Number of leechers, if reported
    pub incomplete: Option<i64>,
    /// Candidate peers
    pub peers: Vec<PeerEndpoint>,
}

/// HTTP tracker client
pub struct TrackerClient {
    client: reqwest::Client,
    announce_url: String,
}

impl TrackerClient {
    /// Create a tracker client for an announce URL
    pub fn new(announce_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(announce_url).map_err(|e| {
            TorrentError::network_error_full("Invalid announce URL", announce_url.to_string(), e.to_string())
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TorrentError::network_error_with_address(
                "Unsupported announce URL scheme",
                announce_url.to_string(),
            )
            .into());
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                TorrentError::network_error_full("Failed to build HTTP client", announce_url.to_string(), e.to_string())
            })?;

        Ok(Self {
            client,
            announce_url: announce_url.to_string(),
        })
    }

    /// Announce to the tracker and collect peer endpoints
    pub async fn announce(
        &self,
        metadata: &TorrentMetadata,
        peer_id: &[u8; 20],
        port: u16,
        stats: AnnounceStats,
    ) -> Result<AnnounceResponse> {
        let request_url = build_announce_url(
            &self.announce_url,
            &metadata.info_hash,
            peer_id,
            port,
            stats,
        );
        info!("Announcing to tracker: {}", self.announce_url);
        debug!("Announce request: {}", request_url);

        let response = self.client.get(&request_url).send().await.map_err(|e| {
            TorrentError::network_error_full(
                "Tracker request failed",
                self.announce_url.clone(),
                e.to_string(),
            )
        })?;
        let body = response.bytes().await.map_err(|e| {
            TorrentError::network_error_full(
                "Failed to read tracker response",
                self.announce_url.clone(),
                e.to_string(),
            )
        })?;

        parse_announce_response(&body)
    }

    /// Get the announce URL
    pub fn announce_url(&self) -> &str {
        &self.announce_url
    }
}

/// Build the full announce URL with query parameters
///
/// The info hash and peer ID are percent-encoded raw bytes, not hex.
fn build_announce_url(
    announce_url: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    stats: AnnounceStats,
) -> String {
    format!(
        "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
        announce_url,
        urlencoding::encode_binary(info_hash),
        urlencoding::encode_binary(peer_id),
        port,
        stats.uploaded,
        stats.downloaded,
        stats.left,
    )
}

/// Parse a bencoded tracker response body
fn parse_announce_response(body: &[u8]) -> Result<AnnounceResponse> {
    let (root, _) = decode(body).map_err(|e| {
        TorrentError::format_error_with_source("Failed to decode tracker response", e.to_string())
    })?;
    if root.as_dict().is_none() {
        return Err(TorrentError::format_error("Tracker response must be a dictionary").into());
    }

    if let Some(reason) = root.get(b"failure reason").and_then(|v| v.as_str()) {
        return Err(TorrentError::network_error_with_address(
            format!("Tracker rejected announce: {}", reason),
            "tracker",
        )
        .into());
    }

    let mut result = AnnounceResponse {
        interval: root.get(b"interval").and_then(|v| v.as_int()),
        min_interval: root.get(b"min interval").and_then(|v| v.as_int()),
        complete: root.get(b"complete").and_then(|v| v.as_int()),
        incomplete: root.get(b"incomplete").and_then(|v| v.as_int()),
        peers: Vec::new(),
    };

    // Absence of peers is a tracker-level failure, not a codec failure.
    let peers_value = root
        .get(b"peers")
        .ok_or_else(|| TorrentError::network_error("No peers in tracker response"))?;

    match peers_value {
        BencodeValue::Bytes(compact) => {
            result.peers = parse_compact_peers(compact);
        }
        BencodeValue::List(entries) => {
            for entry in entries {
                if let Some(peer) = parse_peer_dict(entry) {
                    result.peers.push(peer);
                }
            }
        }
        _ => {
            return Err(TorrentError::format_error("Unrecognized peers representation").into());
        }
    }

    debug!(
        "Tracker returned {} peers (complete: {:?}, incomplete: {:?})",
        result.peers.len(),
        result.complete,
        result.incomplete
    );
    Ok(result)
}

/// Parse compact peer format: 6 bytes per peer, 4-byte IPv4 + 2-byte port
fn parse_compact_peers(data: &[u8]) -> Vec<PeerEndpoint> {
    if data.len() % 6 != 0 {
        warn!("Compact peer data has {} trailing bytes, ignoring them", data.len() % 6);
    }

    data.chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerEndpoint {
                addr: SocketAddr::new(IpAddr::V4(ip), port),
                peer_id: None,
            }
        })
        .collect()
}

/// Parse one entry of a non-compact peer list
fn parse_peer_dict(entry: &BencodeValue) -> Option<PeerEndpoint> {
    let ip: IpAddr = entry.get(b"ip")?.as_str()?.parse().ok()?;
    let port = entry.get(b"port")?.as_int()? as u16;

    let peer_id = entry
        .get(b"peer id")
        .and_then(|v| v.as_bytes())
        .and_then(|b| <[u8; 20]>::try_from(b).ok());

    Some(PeerEndpoint {
        addr: SocketAddr::new(ip, port),
        peer_id,
    })
}
