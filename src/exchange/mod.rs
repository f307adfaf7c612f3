//! Peer exchange module
//!
//! Given the raw bytes of a `.torrent` file, ask the swarm for peers:
//! every tracker the file names plus, optionally, the DHT.

pub mod dht;
pub mod tracker;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::peer::{Peer, PeerSet};
use crate::torrent::TorrentParser;

pub use dht::DhtLookup;
pub use tracker::AnnounceParams;

/// Collaborator that finds peers for a torrent file
#[async_trait]
pub trait PeerExchange: Send + Sync {
    /// Collect peers until `min_peers` are known or `timeout` elapses.
    ///
    /// An empty result is a valid answer, not an error.
    async fn discover(&self, torrent: &[u8], min_peers: usize, timeout: Duration) -> Result<Vec<Peer>>;
}

/// Tracker and DHT based peer exchange
pub struct SwarmExchange {
    client: Client,
    dht: Option<DhtLookup>,
    listen_port: u16,
    peer_id: [u8; 20],
}

impl SwarmExchange {
    pub fn new(client: Client, listen_port: u16, use_dht: bool, dht_bootstrap: Vec<String>) -> Self {
        Self {
            client,
            dht: use_dht.then(|| DhtLookup::new(dht_bootstrap)),
            listen_port,
            peer_id: generate_peer_id(),
        }
    }
}

/// Azureus-style peer id: client tag followed by random alphanumerics
fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(b"-PH0100-");
    let mut rng = rand::thread_rng();
    for byte in peer_id[8..].iter_mut() {
        *byte = rng.sample(rand::distributions::Alphanumeric);
    }
    peer_id
}

#[async_trait]
impl PeerExchange for SwarmExchange {
    async fn discover(&self, torrent: &[u8], min_peers: usize, timeout: Duration) -> Result<Vec<Peer>> {
        let info = TorrentParser::parse_bytes(torrent)?;
        let params = AnnounceParams {
            info_hash: info.info_hash,
            peer_id: self.peer_id,
            port: self.listen_port,
            left: info.total_length,
            num_want: 200,
        };
        info!(
            "Asking swarm of {} for peers ({} trackers{})",
            info.name,
            info.trackers.len(),
            if self.dht.is_some() { " + DHT" } else { "" }
        );

        let (tx, mut rx) = mpsc::channel::<Vec<Peer>>(64);
        let mut tasks = JoinSet::new();

        for tracker in &info.trackers {
            let tracker = tracker.clone();
            let tx = tx.clone();
            if tracker.starts_with("http://") || tracker.starts_with("https://") {
                let client = self.client.clone();
                tasks.spawn(async move {
                    match tracker::announce_http(&client, &tracker, &params).await {
                        Ok(peers) => {
                            debug!("{} returned {} peers", tracker, peers.len());
                            let _ = tx.send(peers).await;
                        }
                        Err(e) => debug!("Announce to {} failed: {:#}", tracker, e),
                    }
                });
            } else if tracker.starts_with("udp://") {
                tasks.spawn(async move {
                    match tracker::announce_udp(&tracker, &params, Duration::from_secs(5)).await {
                        Ok(peers) => {
                            debug!("{} returned {} peers", tracker, peers.len());
                            let _ = tx.send(peers).await;
                        }
                        Err(e) => debug!("Announce to {} failed: {:#}", tracker, e),
                    }
                });
            } else {
                debug!("Skipping tracker with unsupported scheme: {}", tracker);
            }
        }

        if let Some(lookup) = self.dht.clone() {
            let tx = tx.clone();
            let info_hash = info.info_hash;
            tasks.spawn(async move {
                if let Err(e) = lookup.run(info_hash, tx).await {
                    warn!("DHT lookup failed: {:#}", e);
                }
            });
        }
        drop(tx);

        let mut peers = PeerSet::new();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                batch = rx.recv() => match batch {
                    Some(batch) => {
                        peers.extend(batch.into_iter().filter(Peer::is_usable));
                        if peers.len() >= min_peers {
                            debug!("Reached {} peers", peers.len());
                            break;
                        }
                    }
                    // Every announce finished
                    None => break,
                },
                _ = &mut deadline => {
                    debug!("Peer exchange timed out with {} peers", peers.len());
                    break;
                }
            }
        }
        tasks.abort_all();

        info!("Swarm of {} yielded {} peers", info.name, peers.len());
        Ok(peers.into_iter().collect())
    }
}
