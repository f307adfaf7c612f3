//! Compact peer and node encodings
//!
//! Trackers and DHT nodes pack IPv4 endpoints as 6 bytes (address + port)
//! and DHT nodes as 26 bytes (node id + endpoint).

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::Result;

use crate::peer::Peer;

/// Parse peers from compact peer format (6 bytes per peer: 4 bytes IP + 2 bytes port)
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<Peer>> {
    let chunk_size = 6;

    if data.len() % chunk_size != 0 {
        return Err(anyhow::anyhow!("Invalid compact peers data length: {}", data.len()));
    }

    Ok(data
        .chunks_exact(chunk_size)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            Peer::new(ip.into(), port)
        })
        .collect())
}

/// Parse peers from compact IPv6 format (18 bytes per peer)
pub fn parse_compact_peers6(data: &[u8]) -> Result<Vec<Peer>> {
    let chunk_size = 18;

    if data.len() % chunk_size != 0 {
        return Err(anyhow::anyhow!("Invalid compact peers6 data length: {}", data.len()));
    }

    Ok(data
        .chunks_exact(chunk_size)
        .map(|chunk| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&chunk[..16]);
            let port = u16::from_be_bytes([chunk[16], chunk[17]]);
            Peer::new(Ipv6Addr::from(octets).into(), port)
        })
        .collect())
}

/// Parse nodes from compact node format (26 bytes per node: 20 bytes ID + 4 bytes IP + 2 bytes port)
pub fn parse_compact_nodes(data: &[u8]) -> Result<Vec<([u8; 20], SocketAddr)>> {
    let chunk_size = 26;

    if data.len() % chunk_size != 0 {
        return Err(anyhow::anyhow!("Invalid compact nodes data length: {}", data.len()));
    }

    Ok(data
        .chunks_exact(chunk_size)
        .map(|chunk| {
            let mut id = [0u8; 20];
            id.copy_from_slice(&chunk[0..20]);
            let ip = Ipv4Addr::new(chunk[20], chunk[21], chunk[22], chunk[23]);
            let port = u16::from_be_bytes([chunk[24], chunk[25]]);
            (id, SocketAddr::new(ip.into(), port))
        })
        .collect())
}
