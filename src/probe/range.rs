//! IPv4 address ranges for the network probe

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::HarvestError;

/// Inclusive IPv4 range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressRange {
    start: u32,
    end: u32,
}

impl AddressRange {
    /// Range from `start` to `end`, both inclusive
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, HarvestError> {
        let (start, end) = (u32::from(start), u32::from(end));
        if start > end {
            return Err(HarvestError::config_error_with_field(
                format!("Range start {} is after end {}", Ipv4Addr::from(start), Ipv4Addr::from(end)),
                "probe.range",
            ));
        }
        Ok(Self { start, end })
    }

    /// Usable hosts of a CIDR block; network and broadcast addresses are
    /// dropped for prefixes shorter than /31
    pub fn cidr(network: Ipv4Addr, prefix: u8) -> Result<Self, HarvestError> {
        if prefix > 32 {
            return Err(HarvestError::config_error_with_field(
                format!("Invalid prefix length /{}", prefix),
                "probe.range",
            ));
        }
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        let base = u32::from(network) & mask;
        let last = base | !mask;
        if prefix >= 31 {
            Ok(Self { start: base, end: last })
        } else {
            Ok(Self {
                start: base + 1,
                end: last - 1,
            })
        }
    }

    /// The /24 around a hint address; `None` for IPv6 hints
    pub fn around(ip: IpAddr) -> Option<Self> {
        match ip {
            IpAddr::V4(v4) => Self::cidr(v4, 24).ok(),
            IpAddr::V6(_) => None,
        }
    }

    /// Number of hosts in the range
    pub fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    /// A range always holds at least one host
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        (self.start..=self.end).contains(&u32::from(ip))
    }

    /// Every host, in ascending order
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        (self.start..=self.end).map(Ipv4Addr::from)
    }
}

fn parse_address(s: &str) -> Result<Ipv4Addr, HarvestError> {
    s.trim().parse().map_err(|_| {
        HarvestError::config_error_with_field(format!("Invalid IPv4 address {:?}", s.trim()), "probe.range")
    })
}

impl FromStr for AddressRange {
    type Err = HarvestError;

    /// Accepts `10.0.0.0/24`, `10.0.0.5-10.0.0.20` or a single `10.0.0.7`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((network, prefix)) = s.split_once('/') {
            let network = parse_address(network)?;
            let prefix: u8 = prefix.trim().parse().map_err(|_| {
                HarvestError::config_error_with_field(format!("Invalid prefix length in {}", s), "probe.range")
            })?;
            Self::cidr(network, prefix)
        } else if let Some((start, end)) = s.split_once('-') {
            Self::new(parse_address(start)?, parse_address(end)?)
        } else {
            let ip = parse_address(s)?;
            Self::new(ip, ip)
        }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", Ipv4Addr::from(self.start))
        } else {
            write!(f, "{}-{}", Ipv4Addr::from(self.start), Ipv4Addr::from(self.end))
        }
    }
}
