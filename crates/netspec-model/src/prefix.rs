//! IPv4 prefix value type.
//!
//! The partitioner, forwarding tables, and policy keys all speak in terms
//! of CIDR prefixes over the 32-bit address space. This is a plain value
//! type: network address plus prefix length, totally ordered so it can key
//! sorted maps.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

use crate::ModelError;

/// An IPv4 CIDR prefix, e.g. `10.12.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Prefix {
    network: u32,
    length: u8,
}

impl Ipv4Prefix {
    /// The all-encompassing default prefix `0.0.0.0/0`.
    pub const DEFAULT: Ipv4Prefix = Ipv4Prefix {
        network: 0,
        length: 0,
    };

    /// Build a prefix from a network address and length. The address must
    /// have no bits set below the mask.
    pub fn new(network: u32, length: u8) -> Result<Self, ModelError> {
        if length > 32 {
            return Err(ModelError::InvalidPrefix(format!(
                "prefix length {length} exceeds 32"
            )));
        }
        if network & !mask(length) != 0 {
            return Err(ModelError::InvalidPrefix(format!(
                "{}/{} has host bits set",
                Ipv4Addr::from(network),
                length
            )));
        }
        Ok(Ipv4Prefix { network, length })
    }

    /// First address covered by the prefix.
    pub fn network(&self) -> u32 {
        self.network
    }

    /// Last address covered by the prefix.
    pub fn broadcast(&self) -> u32 {
        self.network | !mask(self.length)
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    /// Whether `addr` falls inside this prefix.
    pub fn contains_addr(&self, addr: u32) -> bool {
        addr & mask(self.length) == self.network
    }

    /// Whether `other` is fully covered by this prefix.
    pub fn contains(&self, other: &Ipv4Prefix) -> bool {
        self.length <= other.length && other.network & mask(self.length) == self.network
    }
}

fn mask(length: u8) -> u32 {
    if length == 0 {
        0
    } else {
        u32::MAX << (32 - length)
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.length)
    }
}

impl Serialize for Ipv4Prefix {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = ModelError;

    /// Parse `a.b.c.d/len`; a bare address is treated as a /32 host route.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, length) = match s.split_once('/') {
            Some((addr, len)) => {
                let length: u8 = len
                    .parse()
                    .map_err(|_| ModelError::InvalidPrefix(s.to_string()))?;
                (addr, length)
            }
            None => (s, 32),
        };
        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|_| ModelError::InvalidPrefix(s.to_string()))?;
        Ipv4Prefix::new(u32::from(addr), length)
    }
}
