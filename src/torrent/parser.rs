//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting the metadata needed to
//! reach a swarm. The info hash is computed over the exact bytes of the
//! `info` dictionary as they appear in the file.

use std::collections::BTreeMap;
use std::ops::Range;

use anyhow::Result;
use tracing::{debug, info, trace, warn};

use crate::torrent::info::TorrentInfo;

/// Deepest list/dictionary nesting accepted from the network
pub const MAX_NESTING: usize = 64;

/// Reject bencode nested deeper than `max_depth` without recursing.
///
/// Only the nesting is checked; malformed input is left for the real
/// decoder to report.
pub fn check_nesting(data: &[u8], max_depth: usize) -> Result<()> {
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < data.len() {
        match data[idx] {
            b'l' | b'd' => {
                depth += 1;
                if depth > max_depth {
                    return Err(anyhow::anyhow!("bencode nesting too deep"));
                }
                idx += 1;
            }
            b'e' => {
                depth = depth.saturating_sub(1);
                idx += 1;
            }
            b'i' => match data[idx..].iter().position(|&b| b == b'e') {
                Some(end) => idx += end + 1,
                None => return Ok(()),
            },
            b'0'..=b'9' => {
                let Some(colon) = data[idx..].iter().position(|&b| b == b':') else {
                    return Ok(());
                };
                let length = std::str::from_utf8(&data[idx..idx + colon])
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok());
                match length.and_then(|len| (idx + colon + 1).checked_add(len)) {
                    Some(next) => idx = next,
                    None => return Ok(()),
                }
            }
            _ => return Ok(()),
        }
    }
    Ok(())
}

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentInfo> {
        debug!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let mut idx = 0;
        let root = Self::parse_value(data, &mut idx, 0)?;
        if idx != data.len() {
            warn!("Parsed {}/{} bytes", idx, data.len());
        }

        Self::convert_to_torrent_info(root, data)
    }

    fn parse_value(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue> {
        if *idx >= data.len() {
            return Err(anyhow::anyhow!("Unexpected end of data"));
        }
        if matches!(data[*idx], b'l' | b'd') && depth >= MAX_NESTING {
            return Err(anyhow::anyhow!("bencode nesting too deep"));
        }

        let start = *idx;
        match data[*idx] {
            b'i' => {
                *idx += 1;
                let end = data[*idx..]
                    .iter()
                    .position(|&b| b == b'e')
                    .ok_or_else(|| anyhow::anyhow!("Unterminated integer"))?
                    + *idx;
                let num_str = std::str::from_utf8(&data[*idx..end])?;
                let value: i64 = num_str.parse()?;
                *idx = end + 1;
                Ok(BencodeValue::Int(value))
            }
            b'l' => {
                *idx += 1;
                let mut list = Vec::new();
                while *idx < data.len() && data[*idx] != b'e' {
                    list.push(Self::parse_value(data, idx, depth + 1)?);
                }
                Self::expect_end(data, idx)?;
                Ok(BencodeValue::List(list))
            }
            b'd' => {
                *idx += 1;
                let mut dict = BTreeMap::new();
                while *idx < data.len() && data[*idx] != b'e' {
                    let key = match Self::parse_value(data, idx, depth + 1)? {
                        BencodeValue::Bytes(b) => b,
                        _ => return Err(anyhow::anyhow!("Dictionary key must be bytes")),
                    };
                    let value = Self::parse_value(data, idx, depth + 1)?;
                    dict.insert(key, value);
                }
                Self::expect_end(data, idx)?;
                Ok(BencodeValue::Dict(dict, start..*idx))
            }
            b'0'..=b'9' => {
                let colon = data[*idx..]
                    .iter()
                    .position(|&b| b == b':')
                    .ok_or_else(|| anyhow::anyhow!("Unterminated string length"))?
                    + *idx;
                let len_str = std::str::from_utf8(&data[*idx..colon])?;
                let length: usize = len_str.parse()?;
                let begin = colon + 1;
                let end = begin
                    .checked_add(length)
                    .filter(|&end| end <= data.len())
                    .ok_or_else(|| anyhow::anyhow!("String of length {} runs past end of data", length))?;
                *idx = end;
                Ok(BencodeValue::Bytes(data[begin..end].to_vec()))
            }
            byte => Err(anyhow::anyhow!("Unknown bencode type: {}", byte)),
        }
    }

    fn expect_end(data: &[u8], idx: &mut usize) -> Result<()> {
        if *idx >= data.len() {
            return Err(anyhow::anyhow!("Unterminated list or dictionary"));
        }
        *idx += 1;
        Ok(())
    }

    fn convert_to_torrent_info(parsed: BencodeValue, original_data: &[u8]) -> Result<TorrentInfo> {
        let root_dict = match parsed {
            BencodeValue::Dict(d, _) => d,
            _ => return Err(anyhow::anyhow!("Root must be a dictionary")),
        };

        let mut trackers = Vec::new();
        if let Some(url) = root_dict.get(b"announce".as_slice()).and_then(|v| v.as_str()) {
            trackers.push(url);
        }
        if let Some(BencodeValue::List(tiers)) = root_dict.get(b"announce-list".as_slice()) {
            for tier in tiers {
                if let BencodeValue::List(urls) = tier {
                    for url in urls.iter().filter_map(|u| u.as_str()) {
                        if !trackers.contains(&url) {
                            trackers.push(url);
                        }
                    }
                }
            }
        }

        let (info_dict, info_span) = match root_dict.get(b"info".as_slice()) {
            Some(BencodeValue::Dict(d, span)) => (d, span.clone()),
            _ => return Err(anyhow::anyhow!("Missing info dictionary")),
        };

        let name = info_dict
            .get(b"name".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing name field"))?;

        let total_length = if let Some(len) = info_dict.get(b"length".as_slice()).and_then(|v| v.as_int()) {
            len.max(0) as u64
        } else if let Some(BencodeValue::List(files)) = info_dict.get(b"files".as_slice()) {
            files
                .iter()
                .filter_map(|f| match f {
                    BencodeValue::Dict(d, _) => d.get(b"length".as_slice()).and_then(|v| v.as_int()),
                    _ => None,
                })
                .map(|len| len.max(0) as u64)
                .sum()
        } else {
            return Err(anyhow::anyhow!("Neither length nor files found in info dict"));
        };

        let info_hash = TorrentInfo::generate_info_hash(&original_data[info_span]);

        info!("Parsed torrent {} ({} trackers)", name, trackers.len());
        Ok(TorrentInfo {
            trackers,
            info_hash,
            name,
            total_length,
        })
    }
}

/// Bencode value; dictionaries remember the byte range they were parsed from
#[derive(Debug, Clone)]
enum BencodeValue {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>, Range<usize>),
}

impl BencodeValue {
    fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<String> {
        match self {
            BencodeValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }
}
