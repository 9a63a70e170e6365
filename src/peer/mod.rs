//! Peer module
//!
//! Handles individual peer connections and their protocol state.

pub mod connection;
pub mod state;

// Re-export main types
pub use connection::PeerConnection;
pub use state::{ConnectionState, Peer};
