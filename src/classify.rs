//! Static address-space rules separating structural ARP entries
//! (broadcast, multicast, loopback, ...) from ordinary host mappings.

use std::net::Ipv4Addr;

use serde::Serialize;

use crate::table::{AddressEntry, HwAddr};

const IPV4_MULTICAST_OUI: [u8; 3] = [0x01, 0x00, 0x5e];
const IPV6_MULTICAST_PREFIX: [u8; 2] = [0x33, 0x33];
const RESERVED_PROTOCOL_PREFIX: [u8; 2] = [0x01, 0x00];
const BROADCAST_OUI: [u8; 3] = [0xff, 0xff, 0xff];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareClass {
    Broadcast,
    Ipv4Multicast,
    Ipv6Multicast,
    ReservedProtocol,
    Unresolved,
    /// Private-range host answering with a broadcast or multicast OUI, as
    /// some routers and access points do.
    RouterAnnouncement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkClass {
    LocalControl,
    LocalScope,
    Loopback,
    Broadcast,
    LinkLocal,
    ZeroNetwork,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub hardware: Option<HardwareClass>,
    pub network: Option<NetworkClass>,
}

impl Classification {
    pub fn is_benign_hardware(&self) -> bool {
        self.hardware.is_some()
    }

    pub fn is_benign_network(&self) -> bool {
        self.network.is_some()
    }

    pub fn is_benign(&self) -> bool {
        self.is_benign_hardware() || self.is_benign_network()
    }
}

/// Hardware rules on their own, first match wins.
pub fn classify_hardware(mac: &HwAddr) -> Option<HardwareClass> {
    if *mac == HwAddr::BROADCAST {
        Some(HardwareClass::Broadcast)
    } else if mac.starts_with(&IPV4_MULTICAST_OUI) {
        Some(HardwareClass::Ipv4Multicast)
    } else if mac.starts_with(&IPV6_MULTICAST_PREFIX) {
        Some(HardwareClass::Ipv6Multicast)
    } else if mac.starts_with(&RESERVED_PROTOCOL_PREFIX) {
        Some(HardwareClass::ReservedProtocol)
    } else if *mac == HwAddr::ZERO {
        Some(HardwareClass::Unresolved)
    } else {
        None
    }
}

pub fn classify_network(ip: &Ipv4Addr) -> Option<NetworkClass> {
    match ip.octets() {
        [224, 0, 0, _] => Some(NetworkClass::LocalControl),
        [239, 255, 255, _] => Some(NetworkClass::LocalScope),
        [127, ..] => Some(NetworkClass::Loopback),
        [255, 255, 255, _] => Some(NetworkClass::Broadcast),
        [169, 254, ..] => Some(NetworkClass::LinkLocal),
        [0, 0, 0, _] => Some(NetworkClass::ZeroNetwork),
        _ => None,
    }
}

pub fn classify(entry: &AddressEntry) -> Classification {
    let mac = &entry.hardware_address;
    let ip = &entry.network_address;
    let hardware = classify_hardware(mac).or_else(|| {
        let announces = mac.starts_with(&BROADCAST_OUI) || mac.starts_with(&IPV4_MULTICAST_OUI);
        (ip.is_private() && announces).then_some(HardwareClass::RouterAnnouncement)
    });
    Classification { hardware, network: classify_network(ip) }
}

/// Whether the last octet marks the address as a probable router
/// (`.1`, `.254` by default).
pub fn has_router_suffix(ip: &Ipv4Addr, suffixes: &[u8]) -> bool {
    suffixes.contains(&ip.octets()[3])
}
