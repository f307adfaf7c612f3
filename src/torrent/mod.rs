//! Torrent file handling module
//!
//! Parsing `.torrent` metainfo and fetching it from configured sources.

pub mod info;
pub mod parser;
pub mod source;

pub use info::TorrentInfo;
pub use parser::{check_nesting, TorrentParser, MAX_NESTING};
pub use source::{HttpTorrentSource, TorrentSource};
