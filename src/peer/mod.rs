//! Peer module
//!
//! Peer identity, peer sets and the compact wire encodings for them.

pub mod compact;
pub mod endpoint;

// Re-export main types
pub use compact::{parse_compact_nodes, parse_compact_peers, parse_compact_peers6};
pub use endpoint::{Peer, PeerSet};
