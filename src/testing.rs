//! In-memory collaborators shared by the unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::exchange::PeerExchange;
use crate::peer::Peer;
use crate::probe::{AddressRange, NetworkProbe};
use crate::search::{SearchApi, TorrentRecord};
use crate::torrent::TorrentSource;

/// Minimal single-file torrent with two trackers
pub const SAMPLE_TORRENT: &[u8] = b"d8:announce31:http://tracker.example/announce13:announce-listll31:http://tracker.example/announceel30:udp://tracker.example:6969/annee4:infod6:lengthi1024e4:name8:demo.iso12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaaee";

/// Info hash of [`SAMPLE_TORRENT`]
pub const SAMPLE_TORRENT_HASH: &str = "81b9a007b46faaaccbcea22060da65395b1e83d3";

pub fn peers(addrs: &[&str]) -> Vec<Peer> {
    addrs.iter().map(|a| a.parse().unwrap()).collect()
}

pub struct FakeSearch {
    records: Vec<TorrentRecord>,
    failure: Option<String>,
    failing_phrases: Vec<String>,
    info_calls: Mutex<Vec<Vec<String>>>,
    search_calls: Mutex<Vec<(String, Option<String>, Option<String>)>>,
}

impl FakeSearch {
    pub fn returning(records: Vec<TorrentRecord>) -> Self {
        Self {
            records,
            failure: None,
            failing_phrases: Vec::new(),
            info_calls: Mutex::new(Vec::new()),
            search_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut fake = Self::returning(Vec::new());
        fake.failure = Some(message.to_string());
        fake
    }

    /// Fail only searches for this phrase
    pub fn with_failing_phrase(mut self, phrase: &str) -> Self {
        self.failing_phrases.push(phrase.to_string());
        self
    }

    pub fn info_calls(&self) -> Vec<Vec<String>> {
        self.info_calls.lock().unwrap().clone()
    }

    pub fn search_calls(&self) -> Vec<(String, Option<String>, Option<String>)> {
        self.search_calls.lock().unwrap().clone()
    }

    fn answer(&self) -> Result<Vec<TorrentRecord>> {
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(self.records.clone()),
        }
    }
}

#[async_trait]
impl SearchApi for FakeSearch {
    async fn info(&self, hashes: &[String]) -> Result<Vec<TorrentRecord>> {
        self.info_calls.lock().unwrap().push(hashes.to_vec());
        self.answer()
    }

    async fn search(
        &self,
        phrase: &str,
        category: Option<&str>,
        subcategory: Option<&str>,
    ) -> Result<Vec<TorrentRecord>> {
        self.search_calls.lock().unwrap().push((
            phrase.to_string(),
            category.map(str::to_string),
            subcategory.map(str::to_string),
        ));
        if self.failing_phrases.iter().any(|p| p == phrase) {
            return Err(anyhow::anyhow!("search for {} failed", phrase));
        }
        self.answer()
    }

    async fn top(&self, _category: &str, _subcategory: Option<&str>) -> Result<Vec<TorrentRecord>> {
        self.answer()
    }

    async fn description(&self, _hash: &str) -> Result<String> {
        Ok("description".to_string())
    }

    async fn count_total(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }
}

pub struct FakeSource {
    name: String,
    body: Option<Bytes>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn serving(name: &str, body: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            body: Some(Bytes::copy_from_slice(body)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            body: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TorrentSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, info_hash: &str) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} does not have {}", self.name, info_hash))
    }
}

pub struct FakeExchange {
    peers: Mutex<Vec<Peer>>,
    failure: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeExchange {
    pub fn returning(peers: Vec<Peer>) -> Self {
        Self {
            peers: Mutex::new(peers),
            failure: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut fake = Self::returning(Vec::new());
        fake.failure = Some(message.to_string());
        fake
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_peers(&self, peers: Vec<Peer>) {
        *self.peers.lock().unwrap() = peers;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerExchange for FakeExchange {
    async fn discover(&self, _torrent: &[u8], _min_peers: usize, _timeout: Duration) -> Result<Vec<Peer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(anyhow::anyhow!("{}", message));
        }
        Ok(self.peers.lock().unwrap().clone())
    }
}

pub struct FakeProbe {
    peers: Vec<Peer>,
    calls: Mutex<Vec<(AddressRange, u16)>>,
}

impl FakeProbe {
    pub fn returning(peers: Vec<Peer>) -> Self {
        Self {
            peers,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(AddressRange, u16)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkProbe for FakeProbe {
    async fn probe(&self, range: &AddressRange, port: u16) -> Result<Vec<Peer>> {
        self.calls.lock().unwrap().push((*range, port));
        Ok(self.peers.clone())
    }
}
