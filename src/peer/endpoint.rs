//! Peer endpoint module
//!
//! A peer is identified by its address and port only.

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// A network endpoint believed to be part of a torrent swarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,
}

/// Ordered set of peers; ordering keeps persisted records stable
pub type PeerSet = BTreeSet<Peer>;

impl Peer {
    /// Create a new peer
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Get the peer as a socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Peers with port 0 or an unspecified address cannot be contacted
    pub fn is_usable(&self) -> bool {
        self.port != 0 && !self.ip.is_unspecified()
    }
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl FromStr for Peer {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddr = s.trim().parse()?;
        Ok(addr.into())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}
