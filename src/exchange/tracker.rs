//! Tracker announce module
//!
//! HTTP(S) announces with compact responses and UDP announces (BEP 15).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::{Buf, BufMut, BytesMut};
use reqwest::Client;
use serde_bencode::value::Value;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};
use url::{form_urlencoded, Url};

use crate::peer::{parse_compact_peers, parse_compact_peers6, Peer};
use crate::torrent::{check_nesting, MAX_NESTING};

/// Magic constant of the UDP tracker connect request
const UDP_PROTOCOL_ID: u64 = 0x0417_2710_1980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;
const EVENT_STARTED: u32 = 2;

/// Parameters shared by every announce for one torrent
#[derive(Debug, Clone, Copy)]
pub struct AnnounceParams {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub left: u64,
    pub num_want: u32,
}

/// Announce to an HTTP or HTTPS tracker
pub async fn announce_http(client: &Client, tracker: &str, params: &AnnounceParams) -> Result<Vec<Peer>> {
    let url = make_announce_url(tracker, params);
    debug!("Announcing to {}", tracker);

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Announce to {} failed", tracker))?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow::anyhow!("HTTP {} from tracker {}", status, tracker));
    }
    let body = response.bytes().await?;
    trace!("Tracker {} answered with {} bytes", tracker, body.len());
    parse_http_response(&body)
}

fn make_announce_url(tracker: &str, params: &AnnounceParams) -> String {
    let separator = if tracker.contains('?') { '&' } else { '?' };
    let info_hash: String = form_urlencoded::byte_serialize(&params.info_hash).collect();
    let peer_id: String = form_urlencoded::byte_serialize(&params.peer_id).collect();
    format!(
        "{}{}info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1&numwant={}&event=started",
        tracker, separator, info_hash, peer_id, params.port, params.left, params.num_want
    )
}

/// Parse a bencoded HTTP tracker response into peers
pub fn parse_http_response(body: &[u8]) -> Result<Vec<Peer>> {
    check_nesting(body, MAX_NESTING)?;
    let value: Value = serde_bencode::from_bytes(body).context("Tracker response is not bencoded")?;
    let dict = match value {
        Value::Dict(d) => d,
        _ => return Err(anyhow::anyhow!("Tracker response is not a dictionary")),
    };

    if let Some(Value::Bytes(reason)) = dict.get(b"failure reason".as_slice()) {
        return Err(anyhow::anyhow!("Tracker failure: {}", String::from_utf8_lossy(reason)));
    }

    let mut peers = Vec::new();
    match dict.get(b"peers".as_slice()) {
        Some(Value::Bytes(compact)) => peers.extend(parse_compact_peers(compact)?),
        Some(Value::List(entries)) => {
            for entry in entries {
                if let Value::Dict(entry) = entry {
                    let ip = match entry.get(b"ip".as_slice()) {
                        Some(Value::Bytes(ip)) => String::from_utf8_lossy(ip).parse().ok(),
                        _ => None,
                    };
                    let port = match entry.get(b"port".as_slice()) {
                        Some(Value::Int(port)) => u16::try_from(*port).ok(),
                        _ => None,
                    };
                    if let (Some(ip), Some(port)) = (ip, port) {
                        peers.push(Peer::new(ip, port));
                    }
                }
            }
        }
        _ => {}
    }
    if let Some(Value::Bytes(compact6)) = dict.get(b"peers6".as_slice()) {
        peers.extend(parse_compact_peers6(compact6)?);
    }

    Ok(peers)
}

/// Announce to a UDP tracker
pub async fn announce_udp(tracker: &str, params: &AnnounceParams, step_timeout: Duration) -> Result<Vec<Peer>> {
    let url = Url::parse(tracker).with_context(|| format!("Invalid tracker url: {}", tracker))?;
    let host = url.host_str().ok_or_else(|| anyhow::anyhow!("Tracker url has no host: {}", tracker))?;
    let port = url.port().ok_or_else(|| anyhow::anyhow!("Tracker url has no port: {}", tracker))?;

    let addr: SocketAddr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Tracker host did not resolve: {}", host))?;
    let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;
    debug!("Announcing to {} ({})", tracker, addr);

    let mut buf = vec![0u8; 4096];

    let transaction_id: u32 = rand::random();
    socket.send(&build_connect_request(transaction_id)).await?;
    let n = timeout(step_timeout, socket.recv(&mut buf)).await??;
    let connection_id = parse_connect_response(&buf[..n], transaction_id)?;

    let transaction_id: u32 = rand::random();
    socket
        .send(&build_announce_request(connection_id, transaction_id, params))
        .await?;
    let n = timeout(step_timeout, socket.recv(&mut buf)).await??;
    parse_announce_response(&buf[..n], transaction_id, addr.is_ipv6())
}

fn build_connect_request(transaction_id: u32) -> BytesMut {
    let mut req = BytesMut::with_capacity(16);
    req.put_u64(UDP_PROTOCOL_ID);
    req.put_u32(ACTION_CONNECT);
    req.put_u32(transaction_id);
    req
}

fn build_announce_request(connection_id: u64, transaction_id: u32, params: &AnnounceParams) -> BytesMut {
    let mut req = BytesMut::with_capacity(98);
    req.put_u64(connection_id);
    req.put_u32(ACTION_ANNOUNCE);
    req.put_u32(transaction_id);
    req.put_slice(&params.info_hash);
    req.put_slice(&params.peer_id);
    req.put_u64(0); // downloaded
    req.put_u64(params.left);
    req.put_u64(0); // uploaded
    req.put_u32(EVENT_STARTED);
    req.put_u32(0); // ip: let the tracker use the source address
    req.put_u32(rand::random()); // key
    req.put_i32(params.num_want as i32);
    req.put_u16(params.port);
    req
}

fn check_header(mut data: &[u8], expected_action: u32, transaction_id: u32) -> Result<&[u8]> {
    if data.len() < 8 {
        return Err(anyhow::anyhow!("UDP tracker response too short: {} bytes", data.len()));
    }
    let action = data.get_u32();
    let tid = data.get_u32();
    if tid != transaction_id {
        return Err(anyhow::anyhow!("UDP tracker transaction id mismatch"));
    }
    if action == ACTION_ERROR {
        return Err(anyhow::anyhow!("Tracker failure: {}", String::from_utf8_lossy(data)));
    }
    if action != expected_action {
        return Err(anyhow::anyhow!("Unexpected UDP tracker action {}", action));
    }
    Ok(data)
}

fn parse_connect_response(data: &[u8], transaction_id: u32) -> Result<u64> {
    let mut rest = check_header(data, ACTION_CONNECT, transaction_id)?;
    if rest.len() < 8 {
        return Err(anyhow::anyhow!("UDP connect response too short"));
    }
    Ok(rest.get_u64())
}

fn parse_announce_response(data: &[u8], transaction_id: u32, ipv6: bool) -> Result<Vec<Peer>> {
    let mut rest = check_header(data, ACTION_ANNOUNCE, transaction_id)?;
    if rest.len() < 12 {
        return Err(anyhow::anyhow!("UDP announce response too short"));
    }
    let interval = rest.get_u32();
    let leechers = rest.get_u32();
    let seeders = rest.get_u32();
    trace!("UDP announce: interval {}s, {} leechers, {} seeders", interval, leechers, seeders);

    if ipv6 {
        parse_compact_peers6(rest)
    } else {
        parse_compact_peers(rest)
    }
}
