//! ARP table data model.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// A 48-bit hardware address. The only textual form is lower-case,
/// colon-separated, two digits per octet.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct HwAddr(pub [u8; 6]);

impl HwAddr {
    pub const BROADCAST: HwAddr = HwAddr([0xff; 6]);
    pub const ZERO: HwAddr = HwAddr([0x00; 6]);

    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self([a, b, c, d, e, f])
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl Serialize for HwAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hardware address {0:?}")]
pub struct ParseHwAddrError(String);

impl FromStr for HwAddr {
    type Err = ParseHwAddrError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF`, `aabb.ccdd.eeff`
    /// and unpadded octets such as `0:1e:c2:9:5:a`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHwAddrError(s.to_string());
        let s = s.trim();
        let mut octets = [0u8; 6];

        if s.contains('.') {
            let groups: Vec<&str> = s.split('.').collect();
            if groups.len() != 3 {
                return Err(err());
            }
            for (i, group) in groups.iter().enumerate() {
                if group.len() != 4 {
                    return Err(err());
                }
                let word = u16::from_str_radix(group, 16).map_err(|_| err())?;
                octets[i * 2..i * 2 + 2].copy_from_slice(&word.to_be_bytes());
            }
            return Ok(HwAddr(octets));
        }

        let parts: Vec<&str> = s.split(|c: char| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(err());
        }
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(err());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        Ok(HwAddr(octets))
    }
}

/// One observed IP to hardware address mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AddressEntry {
    pub network_address: Ipv4Addr,
    pub hardware_address: HwAddr,
    pub interface_label: String,
}

impl AddressEntry {
    pub fn new(network_address: Ipv4Addr, hardware_address: HwAddr, interface_label: impl Into<String>) -> Self {
        Self { network_address, hardware_address, interface_label: interface_label.into() }
    }

    /// Builds an entry from raw OS text, returning `None` for anything that
    /// isn't a dotted-quad IPv4 address and a 6-octet hardware address.
    pub fn parse(network_address: &str, hardware_address: &str, interface_label: &str) -> Option<Self> {
        let network_address = network_address.trim().parse().ok()?;
        let hardware_address = hardware_address.parse().ok()?;
        Some(Self::new(network_address, hardware_address, interface_label.trim()))
    }
}

/// A snapshot of the ARP table, in OS order. Built once per scan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AddressTable {
    entries: Vec<AddressEntry>,
}

impl AddressTable {
    pub fn new(entries: Vec<AddressEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[AddressEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AddressEntry> {
        self.entries.iter()
    }

    /// First entry bound to `ip`.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<&AddressEntry> {
        self.entries.iter().find(|entry| entry.network_address == ip)
    }
}

impl FromIterator<AddressEntry> for AddressTable {
    fn from_iter<I: IntoIterator<Item = AddressEntry>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a AddressTable {
    type Item = &'a AddressEntry;
    type IntoIter = std::slice::Iter<'a, AddressEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
