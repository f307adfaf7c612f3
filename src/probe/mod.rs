//! Network probe module
//!
//! Last-resort discovery: sweep an address range for hosts that accept a
//! TCP connection on the BitTorrent port.

pub mod range;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::peer::Peer;

pub use range::AddressRange;

/// Collaborator that detects reachable hosts in a range
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn probe(&self, range: &AddressRange, port: u16) -> Result<Vec<Peer>>;
}

/// Bounded-concurrency TCP connect sweep
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
    concurrency: usize,
    max_hosts: u64,
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration, concurrency: usize, max_hosts: u64) -> Self {
        Self {
            connect_timeout,
            concurrency: concurrency.max(1),
            max_hosts,
        }
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn probe(&self, range: &AddressRange, port: u16) -> Result<Vec<Peer>> {
        if range.len() > self.max_hosts {
            return Err(anyhow::anyhow!(
                "Range {} has {} hosts, limit is {}",
                range,
                range.len(),
                self.max_hosts
            ));
        }
        info!("Probing {} hosts in {} on port {}", range.len(), range, port);

        let connect_timeout = self.connect_timeout;
        let mut peers: Vec<Peer> = stream::iter(range.hosts())
            .map(|ip| async move {
                let addr = SocketAddr::new(IpAddr::V4(ip), port);
                match timeout(connect_timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_stream)) => {
                        debug!("{} is reachable", addr);
                        Some(Peer::from(addr))
                    }
                    Ok(Err(e)) => {
                        trace!("{} refused: {}", addr, e);
                        None
                    }
                    Err(_) => None,
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|peer| async move { peer })
            .collect()
            .await;
        peers.sort();

        info!("Probe of {} found {} reachable hosts", range, peers.len());
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_finds_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((_socket, _)) = listener.accept().await {}
        });

        let probe = TcpProbe::new(Duration::from_millis(500), 4, 16);
        let range = AddressRange::new(Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        let peers = probe.probe(&range, port).await.unwrap();
        assert_eq!(peers, vec![Peer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)]);
    }

    #[tokio::test]
    async fn test_probe_rejects_oversized_range() {
        let probe = TcpProbe::new(Duration::from_millis(10), 4, 16);
        let range: AddressRange = "10.0.0.0/24".parse().unwrap();
        assert!(probe.probe(&range, 6881).await.is_err());
    }
}
