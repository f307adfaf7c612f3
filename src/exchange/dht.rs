//! DHT lookup module
//!
//! An iterative `get_peers` walk over the mainline DHT (BEP 5). The walk
//! starts at the bootstrap routers and keeps querying the closest unvisited
//! nodes it has heard of, forwarding every batch of peers it is handed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde_bencode::value::Value;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

use crate::peer::{parse_compact_nodes, parse_compact_peers, Peer};
use crate::torrent::{check_nesting, MAX_NESTING};

/// Routers used when the configuration names none
pub const DEFAULT_BOOTSTRAP: [&str; 3] = [
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
];

/// Queries in flight per round
const ALPHA: usize = 8;

/// DHT node identifier (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    /// Generate a random NodeId
    pub fn random() -> Self {
        let mut id = [0u8; 20];
        rand::thread_rng().fill(&mut id);
        Self(id)
    }

    /// XOR distance to a key; compares big-endian
    pub fn distance_to(&self, key: &[u8; 20]) -> [u8; 20] {
        let mut distance = [0u8; 20];
        for (d, (a, b)) in distance.iter_mut().zip(self.0.iter().zip(key.iter())) {
            *d = a ^ b;
        }
        distance
    }
}

/// Decoded `get_peers` reply
#[derive(Debug, Default)]
pub struct GetPeersReply {
    pub transaction_id: Vec<u8>,
    pub peers: Vec<Peer>,
    pub nodes: Vec<(NodeId, SocketAddr)>,
}

/// Iterative `get_peers` lookup
#[derive(Debug, Clone)]
pub struct DhtLookup {
    bootstrap: Vec<String>,
    max_queries: usize,
    round_timeout: Duration,
}

impl DhtLookup {
    pub fn new(bootstrap: Vec<String>) -> Self {
        let bootstrap = if bootstrap.is_empty() {
            DEFAULT_BOOTSTRAP.iter().map(|s| s.to_string()).collect()
        } else {
            bootstrap
        };
        Self {
            bootstrap,
            max_queries: 256,
            round_timeout: Duration::from_secs(2),
        }
    }

    /// Walk the DHT toward `info_hash`, sending peer batches on `tx`.
    ///
    /// Returns when the walk runs out of nodes, hits its query budget, or
    /// the receiving side goes away.
    pub async fn run(&self, info_hash: [u8; 20], tx: mpsc::Sender<Vec<Peer>>) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await.context("Failed to bind DHT socket")?;
        let our_id = NodeId::random();

        let mut frontier = Vec::new();
        for router in &self.bootstrap {
            match tokio::net::lookup_host(router.as_str()).await {
                Ok(addrs) => frontier.extend(addrs.filter(SocketAddr::is_ipv4)),
                Err(e) => warn!("Could not resolve DHT router {}: {}", router, e),
            }
        }
        if frontier.is_empty() {
            return Err(anyhow::anyhow!("No DHT bootstrap node resolved"));
        }

        let mut queried: HashSet<SocketAddr> = HashSet::new();
        let mut known: BTreeMap<[u8; 20], SocketAddr> = BTreeMap::new();
        let mut buf = vec![0u8; 2048];

        while !frontier.is_empty() && queried.len() < self.max_queries {
            let mut pending: HashMap<Vec<u8>, SocketAddr> = HashMap::new();
            for addr in frontier.drain(..) {
                if !queried.insert(addr) {
                    continue;
                }
                let transaction_id = rand::random::<u16>().to_be_bytes().to_vec();
                let query = encode_get_peers(&transaction_id, &our_id, &info_hash)?;
                if let Err(e) = socket.send_to(&query, addr).await {
                    trace!("get_peers to {} failed: {}", addr, e);
                    continue;
                }
                pending.insert(transaction_id, addr);
            }

            let deadline = Instant::now() + self.round_timeout;
            while !pending.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let (n, from) = match timeout(remaining, socket.recv_from(&mut buf)).await {
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) => {
                        trace!("DHT receive error: {}", e);
                        continue;
                    }
                    Err(_) => break,
                };

                let reply = match decode_get_peers_reply(&buf[..n]) {
                    Ok(reply) => reply,
                    Err(e) => {
                        trace!("Ignoring DHT message from {}: {}", from, e);
                        continue;
                    }
                };
                if pending.remove(&reply.transaction_id).is_none() {
                    continue;
                }

                if !reply.peers.is_empty() {
                    trace!("{} returned {} peers", from, reply.peers.len());
                    if tx.send(reply.peers).await.is_err() {
                        return Ok(());
                    }
                }
                for (id, addr) in reply.nodes {
                    if !queried.contains(&addr) {
                        known.insert(id.distance_to(&info_hash), addr);
                    }
                }
            }

            frontier = known
                .values()
                .filter(|addr| !queried.contains(*addr))
                .take(ALPHA)
                .copied()
                .collect();
        }

        debug!("DHT walk finished after {} queries", queried.len());
        Ok(())
    }
}

/// Encode a `get_peers` query
pub fn encode_get_peers(transaction_id: &[u8], our_id: &NodeId, info_hash: &[u8; 20]) -> Result<Vec<u8>> {
    let mut args = HashMap::new();
    args.insert(b"id".to_vec(), Value::Bytes(our_id.0.to_vec()));
    args.insert(b"info_hash".to_vec(), Value::Bytes(info_hash.to_vec()));

    let mut message = HashMap::new();
    message.insert(b"t".to_vec(), Value::Bytes(transaction_id.to_vec()));
    message.insert(b"y".to_vec(), Value::Bytes(b"q".to_vec()));
    message.insert(b"q".to_vec(), Value::Bytes(b"get_peers".to_vec()));
    message.insert(b"a".to_vec(), Value::Dict(args));

    serde_bencode::to_bytes(&Value::Dict(message)).map_err(|e| anyhow::anyhow!("Failed to encode DHT query: {}", e))
}

/// Decode a `get_peers` response; errors and queries are rejected
pub fn decode_get_peers_reply(data: &[u8]) -> Result<GetPeersReply> {
    check_nesting(data, MAX_NESTING)?;
    let value: Value = serde_bencode::from_bytes(data)?;
    let message = match value {
        Value::Dict(d) => d,
        _ => return Err(anyhow::anyhow!("DHT message is not a dictionary")),
    };

    let transaction_id = match message.get(b"t".as_slice()) {
        Some(Value::Bytes(t)) => t.clone(),
        _ => return Err(anyhow::anyhow!("DHT message has no transaction id")),
    };
    match message.get(b"y".as_slice()) {
        Some(Value::Bytes(y)) if y.as_slice() == b"r" => {}
        Some(Value::Bytes(y)) if y.as_slice() == b"e" => {
            return Err(anyhow::anyhow!("DHT error reply"));
        }
        _ => return Err(anyhow::anyhow!("DHT message is not a response")),
    }
    let body = match message.get(b"r".as_slice()) {
        Some(Value::Dict(r)) => r,
        _ => return Err(anyhow::anyhow!("DHT response has no body")),
    };

    let mut reply = GetPeersReply {
        transaction_id,
        ..Default::default()
    };
    if let Some(Value::List(values)) = body.get(b"values".as_slice()) {
        for value in values {
            if let Value::Bytes(compact) = value {
                // Malformed entries are skipped, not fatal
                if let Ok(peers) = parse_compact_peers(compact) {
                    reply.peers.extend(peers);
                }
            }
        }
    }
    if let Some(Value::Bytes(nodes)) = body.get(b"nodes".as_slice()) {
        reply.nodes = parse_compact_nodes(nodes)?
            .into_iter()
            .map(|(id, addr)| (NodeId(id), addr))
            .collect();
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_orders_closer_first() {
        let key = [0u8; 20];
        let near = NodeId([0x01; 20]);
        let far = NodeId([0xf0; 20]);
        assert!(near.distance_to(&key) < far.distance_to(&key));
        assert_eq!(near.distance_to(&near.0), [0u8; 20]);
    }

    #[test]
    fn test_encode_get_peers_is_sorted_bencode() {
        let query = encode_get_peers(b"aa", &NodeId([b'x'; 20]), &[b'h'; 20]).unwrap();
        let expected = format!(
            "d1:ad2:id20:{}9:info_hash20:{}e1:q9:get_peers1:t2:aa1:y1:qe",
            "x".repeat(20),
            "h".repeat(20)
        );
        assert_eq!(query, expected.into_bytes());
    }

    #[test]
    fn test_decode_values_and_nodes() {
        let mut data = b"d1:rd5:nodes26:".to_vec();
        data.extend_from_slice(&[b'n'; 20]);
        data.extend_from_slice(&[10, 0, 0, 1, 0x1A, 0xE1]);
        data.extend_from_slice(b"6:valuesl6:");
        data.extend_from_slice(&[1, 2, 3, 4, 0xC8, 0xD5]);
        data.extend_from_slice(b"ee1:t2:aa1:y1:re");

        let reply = decode_get_peers_reply(&data).unwrap();
        assert_eq!(reply.transaction_id, b"aa".to_vec());
        assert_eq!(reply.peers, vec!["1.2.3.4:51413".parse::<Peer>().unwrap()]);
        assert_eq!(reply.nodes.len(), 1);
        assert_eq!(reply.nodes[0].1, "10.0.0.1:6881".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_decode_rejects_error_reply() {
        assert!(decode_get_peers_reply(b"d1:eli201e7:Generice1:t2:aa1:y1:ee").is_err());
    }

    #[test]
    fn test_decode_rejects_deep_nesting() {
        let data = vec![b'l'; 2048];
        assert!(decode_get_peers_reply(&data).is_err());
    }

    #[test]
    fn test_default_bootstrap_used_when_empty() {
        let lookup = DhtLookup::new(Vec::new());
        assert_eq!(lookup.bootstrap.len(), DEFAULT_BOOTSTRAP.len());
    }
}
