//! Rule-based ARP spoofing detection over a single table snapshot.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::classify::{classify, classify_hardware, has_router_suffix, HardwareClass};
use crate::gateway::Gateway;
use crate::table::{AddressTable, HwAddr};

pub const DEFAULT_DUPLICATE_THRESHOLD: usize = 3;
pub const DEFAULT_ROUTER_SUFFIXES: [u8; 2] = [1, 254];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration order is the canonical order used in summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    DuplicateMapping,
    GatewayMultiHardware,
    InfoBroadcast,
    InfoMulticast,
    InfoSpecialAddress,
    InfoOther,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::DuplicateMapping,
        Category::GatewayMultiHardware,
        Category::InfoBroadcast,
        Category::InfoMulticast,
        Category::InfoSpecialAddress,
        Category::InfoOther,
    ];

    pub fn severity(&self) -> Severity {
        match self {
            Category::GatewayMultiHardware => Severity::Critical,
            Category::DuplicateMapping => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DuplicateMapping => "duplicate-mapping",
            Category::GatewayMultiHardware => "gateway-multi-hardware",
            Category::InfoBroadcast => "info-broadcast",
            Category::InfoMulticast => "info-multicast",
            Category::InfoSpecialAddress => "info-special-address",
            Category::InfoOther => "info-other",
        }
    }

    /// Human label used in report summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Category::DuplicateMapping => "Hardware addresses with multiple network addresses",
            Category::GatewayMultiHardware => "Gateway with multiple hardware addresses",
            Category::InfoBroadcast => "Broadcast hardware addresses",
            Category::InfoMulticast => "Multicast or reserved hardware addresses",
            Category::InfoSpecialAddress => "Special network addresses",
            Category::InfoOther => "Shared hardware addresses (likely router/AP)",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addresses implicated by a finding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RelatedAddresses {
    pub network: Vec<Ipv4Addr>,
    pub hardware: Vec<HwAddr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub category: Category,
    pub severity: Severity,
    pub message: String,
    pub related_addresses: RelatedAddresses,
}

impl Finding {
    pub fn new(category: Category, message: String, related_addresses: RelatedAddresses) -> Self {
        Self { category, severity: category.severity(), message, related_addresses }
    }

    pub fn is_suspicious(&self) -> bool {
        self.severity > Severity::Info
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Hardware addresses shared by at most this many hosts are reported as
    /// informational only.
    pub duplicate_threshold: usize,
    /// Last octets of addresses left out of duplicate aggregation.
    pub router_suffixes: Vec<u8>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD, router_suffixes: DEFAULT_ROUTER_SUFFIXES.to_vec() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Findings in report order: shared hardware addresses, the gateway
    /// finding, then one informational finding per structural entry.
    pub fn detect(&self, table: &AddressTable, gateway: &Gateway) -> Vec<Finding> {
        let mut findings = self.shared_hardware(table);
        findings.extend(self.gateway_integrity(table, gateway));
        findings.extend(self.structural_entries(table));
        log::debug!("{} findings over {} entries", findings.len(), table.len());
        findings
    }

    fn shared_hardware(&self, table: &AddressTable) -> Vec<Finding> {
        // First-seen order for both keys and values
        let mut groups: Vec<(HwAddr, Vec<Ipv4Addr>)> = Vec::new();
        let mut index: HashMap<HwAddr, usize> = HashMap::new();

        for entry in table {
            if classify(entry).is_benign() || has_router_suffix(&entry.network_address, &self.config.router_suffixes) {
                continue;
            }
            let i = *index.entry(entry.hardware_address).or_insert_with(|| {
                groups.push((entry.hardware_address, Vec::new()));
                groups.len() - 1
            });
            let ips = &mut groups[i].1;
            if !ips.contains(&entry.network_address) {
                ips.push(entry.network_address);
            }
        }

        groups
            .into_iter()
            .filter(|(_, ips)| ips.len() > 1)
            .map(|(mac, ips)| {
                let (category, message) = if ips.len() <= self.config.duplicate_threshold {
                    (
                        Category::InfoOther,
                        format!("Info: {} is shared by {} addresses: {} - likely a router/AP", mac, ips.len(), join(&ips)),
                    )
                } else {
                    (
                        Category::DuplicateMapping,
                        format!("Suspicious: {} is claimed by {} different addresses: {}", mac, ips.len(), join(&ips)),
                    )
                };
                Finding::new(category, message, RelatedAddresses { network: ips, hardware: vec![mac] })
            })
            .collect()
    }

    fn gateway_integrity(&self, table: &AddressTable, gateway: &Gateway) -> Option<Finding> {
        let ip = gateway.network_address()?;
        let bound: Vec<HwAddr> = table.iter().filter(|e| e.network_address == ip).map(|e| e.hardware_address).collect();
        if bound.len() < 2 {
            return None;
        }

        let mut suspects: Vec<HwAddr> = Vec::new();
        for mac in bound {
            if classify_hardware(&mac).is_none() && !suspects.contains(&mac) {
                suspects.push(mac);
            }
        }
        if suspects.len() < 2 {
            return None;
        }

        log::warn!("Gateway {} is answered by {} hardware addresses", ip, suspects.len());
        Some(Finding::new(
            Category::GatewayMultiHardware,
            format!("DANGER: gateway {} is answered by multiple hardware addresses: {}", ip, join(&suspects)),
            RelatedAddresses { network: vec![ip], hardware: suspects },
        ))
    }

    fn structural_entries(&self, table: &AddressTable) -> Vec<Finding> {
        table
            .iter()
            .filter_map(|entry| {
                let class = classify(entry);
                let (ip, mac) = (entry.network_address, entry.hardware_address);
                let (category, message) = match (class.hardware, class.network) {
                    (Some(HardwareClass::Broadcast), _) => {
                        (Category::InfoBroadcast, format!("Info: broadcast hardware address: IP={}, MAC={}", ip, mac))
                    }
                    // Only benign alongside a private IP, not on its own
                    (Some(HardwareClass::RouterAnnouncement), _) => return None,
                    (Some(_), _) => (Category::InfoMulticast, format!("Info: special hardware address: IP={}, MAC={}", ip, mac)),
                    (None, Some(_)) => (Category::InfoSpecialAddress, format!("Info: special network address: IP={}, MAC={}", ip, mac)),
                    (None, None) => return None,
                };
                Some(Finding::new(category, message, RelatedAddresses { network: vec![ip], hardware: vec![mac] }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::AddressEntry;

    fn table(rows: &[(&str, &str)]) -> AddressTable {
        rows.iter().map(|(ip, mac)| AddressEntry::parse(ip, mac, "eth0").unwrap()).collect()
    }

    fn gateway(ip: &str, mac: &str) -> Gateway {
        Gateway::Known { network_address: ip.parse().unwrap(), hardware_address: mac.parse().unwrap() }
    }

    fn categories(findings: &[Finding]) -> Vec<Category> {
        findings.iter().map(|f| f.category).collect()
    }

    #[test]
    fn should_derive_severity_from_category() {
        assert_eq!(Category::GatewayMultiHardware.severity(), Severity::Critical);
        assert_eq!(Category::DuplicateMapping.severity(), Severity::Warning);
        for category in [Category::InfoBroadcast, Category::InfoMulticast, Category::InfoSpecialAddress, Category::InfoOther] {
            assert_eq!(category.severity(), Severity::Info);
        }
    }

    #[test]
    fn should_find_nothing_in_empty_table() {
        let findings = Detector::default().detect(&AddressTable::default(), &Gateway::Unknown);
        assert!(findings.is_empty());
    }

    #[test]
    fn should_ignore_unique_mappings() {
        let t = table(&[("192.168.1.10", "aa:aa:aa:aa:aa:01"), ("192.168.1.11", "aa:aa:aa:aa:aa:02")]);
        assert!(Detector::default().detect(&t, &Gateway::Unknown).is_empty());
    }

    #[test]
    fn should_report_small_groups_as_info() {
        let t = table(&[
            ("192.168.1.10", "aa:aa:aa:aa:aa:01"),
            ("192.168.1.11", "AA-AA-AA-AA-AA-01"),
            ("192.168.1.12", "aa:aa:aa:aa:aa:01"),
        ]);
        let findings = Detector::default().detect(&t, &Gateway::Unknown);
        assert_eq!(categories(&findings), vec![Category::InfoOther]);
        assert_eq!(findings[0].related_addresses.network.len(), 3);
        assert!(findings[0].message.contains("192.168.1.10, 192.168.1.11, 192.168.1.12"));
        assert!(!findings[0].is_suspicious());
    }

    #[test]
    fn should_report_large_groups_as_duplicate_mapping() {
        let t = table(&[
            ("192.168.1.10", "aa:aa:aa:aa:aa:01"),
            ("192.168.1.11", "aa:aa:aa:aa:aa:01"),
            ("192.168.1.12", "aa:aa:aa:aa:aa:01"),
            ("192.168.1.13", "aa:aa:aa:aa:aa:01"),
        ]);
        let findings = Detector::default().detect(&t, &Gateway::Unknown);
        assert_eq!(categories(&findings), vec![Category::DuplicateMapping]);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].related_addresses.network.len(), 4);
        assert_eq!(findings[0].related_addresses.hardware, vec!["aa:aa:aa:aa:aa:01".parse::<HwAddr>().unwrap()]);
        for ip in ["192.168.1.10", "192.168.1.11", "192.168.1.12", "192.168.1.13"] {
            assert!(findings[0].message.contains(ip));
        }
    }

    #[test]
    fn should_honour_configured_threshold() {
        let t = table(&[("10.0.0.10", "aa:aa:aa:aa:aa:01"), ("10.0.0.11", "aa:aa:aa:aa:aa:01")]);
        let detector = Detector::new(DetectorConfig { duplicate_threshold: 1, ..Default::default() });
        assert_eq!(categories(&detector.detect(&t, &Gateway::Unknown)), vec![Category::DuplicateMapping]);
    }

    #[test]
    fn should_count_distinct_addresses_only() {
        let t = table(&[
            ("192.168.1.10", "aa:aa:aa:aa:aa:01"),
            ("192.168.1.10", "aa:aa:aa:aa:aa:01"),
        ]);
        assert!(Detector::default().detect(&t, &Gateway::Unknown).is_empty());
    }

    #[test]
    fn should_exclude_router_suffixes_from_aggregation() {
        let t = table(&[
            ("192.168.1.1", "aa:aa:aa:aa:aa:01"),
            ("192.168.2.254", "aa:aa:aa:aa:aa:01"),
            ("192.168.1.20", "aa:aa:aa:aa:aa:01"),
        ]);
        assert!(Detector::default().detect(&t, &Gateway::Unknown).is_empty());

        let detector = Detector::new(DetectorConfig { router_suffixes: vec![], ..Default::default() });
        assert_eq!(categories(&detector.detect(&t, &Gateway::Unknown)), vec![Category::InfoOther]);
    }

    #[test]
    fn should_accept_gateway_with_one_real_and_benign_hardware() {
        let t = table(&[
            ("192.168.1.1", "aa:bb:cc:dd:ee:ff"),
            ("192.168.1.1", "ff:ff:ff:ff:ff:ff"),
            ("192.168.1.1", "01:00:5e:00:00:01"),
        ]);
        let findings = Detector::default().detect(&t, &gateway("192.168.1.1", "aa:bb:cc:dd:ee:ff"));
        assert!(!findings.iter().any(|f| f.category == Category::GatewayMultiHardware));
    }

    #[test]
    fn should_flag_gateway_answered_by_two_hardware_addresses() {
        let t = table(&[
            ("192.168.1.1", "aa:bb:cc:dd:ee:ff"),
            ("192.168.1.1", "de:ad:be:ef:00:01"),
            ("192.168.1.1", "ff:ff:ff:ff:ff:ff"),
        ]);
        let findings = Detector::default().detect(&t, &gateway("192.168.1.1", "aa:bb:cc:dd:ee:ff"));
        let critical: Vec<_> = findings.iter().filter(|f| f.severity == Severity::Critical).collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].category, Category::GatewayMultiHardware);
        assert_eq!(
            critical[0].related_addresses.hardware,
            vec!["aa:bb:cc:dd:ee:ff".parse::<HwAddr>().unwrap(), "de:ad:be:ef:00:01".parse::<HwAddr>().unwrap()]
        );
        assert!(critical[0].message.contains("aa:bb:cc:dd:ee:ff"));
        assert!(critical[0].message.contains("de:ad:be:ef:00:01"));
    }

    #[test]
    fn should_not_flag_gateway_repeating_one_hardware_address() {
        let t = table(&[("192.168.1.1", "aa:bb:cc:dd:ee:ff"), ("192.168.1.1", "AA-BB-CC-DD-EE-FF")]);
        let findings = Detector::default().detect(&t, &gateway("192.168.1.1", "aa:bb:cc:dd:ee:ff"));
        assert!(!findings.iter().any(|f| f.severity == Severity::Critical));
        assert!(findings.is_empty());
    }

    #[test]
    fn should_stay_silent_on_router_announcement_entries() {
        let t = table(&[("192.168.1.30", "ff:ff:ff:00:11:22"), ("10.0.0.40", "ff:ff:ff:7f:00:01")]);
        assert!(Detector::default().detect(&t, &Gateway::Unknown).is_empty());
    }

    #[test]
    fn should_skip_gateway_check_when_unknown() {
        let t = table(&[("192.168.1.1", "aa:bb:cc:dd:ee:ff"), ("192.168.1.1", "de:ad:be:ef:00:01")]);
        assert!(Detector::default().detect(&t, &Gateway::Unknown).is_empty());
    }

    #[test]
    fn should_describe_structural_entries() {
        let t = table(&[
            ("192.168.1.255", "ff:ff:ff:ff:ff:ff"),
            ("224.0.0.251", "01:00:5e:00:00:fb"),
            ("169.254.3.4", "aa:aa:aa:aa:aa:02"),
            ("192.168.1.20", "aa:aa:aa:aa:aa:03"),
        ]);
        let findings = Detector::default().detect(&t, &Gateway::Unknown);
        assert_eq!(categories(&findings), vec![Category::InfoBroadcast, Category::InfoMulticast, Category::InfoSpecialAddress]);
        assert!(findings.iter().all(|f| !f.is_suspicious()));
    }

    #[test]
    fn should_emit_findings_in_fixed_order() {
        let t = table(&[
            ("192.168.1.255", "ff:ff:ff:ff:ff:ff"),
            ("192.168.1.1", "aa:bb:cc:dd:ee:ff"),
            ("192.168.1.1", "de:ad:be:ef:00:01"),
            ("192.168.1.10", "aa:aa:aa:aa:aa:01"),
            ("192.168.1.11", "aa:aa:aa:aa:aa:01"),
        ]);
        let findings = Detector::default().detect(&t, &gateway("192.168.1.1", "aa:bb:cc:dd:ee:ff"));
        assert_eq!(categories(&findings), vec![Category::InfoOther, Category::GatewayMultiHardware, Category::InfoBroadcast]);
    }
}
