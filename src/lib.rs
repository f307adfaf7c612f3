//! peer-harvester
//!
//! Resolves named targets (search queries or info hashes) into torrents,
//! discovers the peers of their swarms and keeps a merged peer record per
//! target on disk.

pub mod cli;
pub mod discovery;
pub mod error;
pub mod exchange;
pub mod peer;
pub mod pipeline;
pub mod probe;
pub mod resolve;
pub mod search;
pub mod store;
pub mod target;
pub mod torrent;

#[cfg(test)]
mod testing;

pub use error::HarvestError;

pub use cli::{CliArgs, Command, Config, ReportDisplay};
pub use discovery::{DiscoveredPeers, DiscoveryMethod, DiscoverySelector, DiscoverySettings, DiscoveryStage};
pub use exchange::{PeerExchange, SwarmExchange};
pub use peer::{Peer, PeerSet};
pub use pipeline::{Pipeline, PipelineSettings, PipelineStage, RunReport, TargetOutcome, TargetReport};
pub use probe::{AddressRange, NetworkProbe, TcpProbe};
pub use resolve::Resolver;
pub use search::{SearchApi, SearchClient, TorrentRecord};
pub use store::{MergeOutcome, PeerRecord, PeerStore};
pub use target::{Target, TargetDefinition, TargetKey, TargetLoader};
pub use torrent::{HttpTorrentSource, TorrentInfo, TorrentParser, TorrentSource};
