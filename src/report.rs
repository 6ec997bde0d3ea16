use std::collections::BTreeMap;
use std::fmt::Write;

use crate::detect::{Category, Finding};
use crate::gateway::Gateway;
use crate::table::AddressTable;

const RULE_WIDTH: usize = 60;

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
}

/// Per-category finding counts, in canonical category order.
pub fn tally(findings: &[Finding]) -> BTreeMap<Category, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.category).or_insert(0) += 1;
    }
    counts
}

/// Renders a scan as plain text. Pure: identical inputs give identical output.
pub fn render(table: &AddressTable, gateway: &Gateway, findings: &[Finding]) -> String {
    let mut out = String::new();
    let banner = "=".repeat(RULE_WIDTH);

    let _ = writeln!(out, "{}", banner);
    let _ = writeln!(out, "ARP table scan");
    let _ = writeln!(out, "{}", banner);
    let _ = writeln!(out, "Default gateway: {}", gateway);
    let _ = writeln!(out);

    heading(&mut out, "ARP table:");
    let _ = writeln!(out, "{}", format!("{:<15} {:<20} {:<10}", "IP Address", "MAC Address", "Interface").trim_end());
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    for entry in table {
        let row = format!(
            "{:<15} {:<20} {:<10}",
            entry.network_address.to_string(),
            entry.hardware_address.to_string(),
            entry.interface_label
        );
        let _ = writeln!(out, "{}", row.trim_end());
    }
    let _ = writeln!(out);

    heading(&mut out, "Spoofing analysis:");
    if findings.is_empty() {
        let _ = writeln!(out, "No suspicious activity detected.");
    }
    for finding in findings {
        let _ = writeln!(out, "{}", finding.message);
    }
    let _ = writeln!(out);

    let suspicious = findings.iter().filter(|f| f.is_suspicious()).count();
    heading(&mut out, "Summary:");
    let _ = writeln!(out, "Total entries: {}", table.len());
    let _ = writeln!(out, "Total findings: {}", findings.len());
    let _ = writeln!(out, "Suspicious findings: {}", suspicious);
    for (category, count) in tally(findings) {
        let _ = writeln!(out, "- {}: {}", category.label(), count);
    }
    let _ = writeln!(out);
    if findings.iter().any(|f| f.category == Category::GatewayMultiHardware) {
        let _ = writeln!(out, "DANGER: the default gateway is answered by more than one hardware address. This is a strong sign of ARP spoofing.");
    } else if suspicious > 0 {
        let _ = writeln!(out, "Suspicious mappings detected. Your network may be under an ARP spoofing attack.");
    } else {
        let _ = writeln!(out, "Your network looks safe for now.");
    }
    let _ = writeln!(out, "{}", banner);
    out
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::detect::Detector;
    use crate::table::{AddressEntry, HwAddr};

    fn sample() -> (AddressTable, Gateway, Vec<Finding>) {
        let table = AddressTable::new(vec![
            AddressEntry::new(Ipv4Addr::new(192, 168, 1, 1), HwAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff), "eth0"),
            AddressEntry::new(Ipv4Addr::new(192, 168, 1, 3), HwAddr::new(0xaa, 0xbb, 0xcc, 0x11, 0x22, 0x33), "eth0"),
            AddressEntry::new(Ipv4Addr::new(192, 168, 1, 4), HwAddr::new(0xaa, 0xbb, 0xcc, 0x11, 0x22, 0x33), "eth0"),
            AddressEntry::new(Ipv4Addr::new(192, 168, 1, 255), HwAddr::BROADCAST, "eth0"),
        ]);
        let gateway = Gateway::Known {
            network_address: Ipv4Addr::new(192, 168, 1, 1),
            hardware_address: HwAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff),
        };
        let findings = Detector::default().detect(&table, &gateway);
        (table, gateway, findings)
    }

    #[test]
    fn should_render_identically_twice() {
        let (table, gateway, findings) = sample();
        assert_eq!(render(&table, &gateway, &findings), render(&table, &gateway, &findings));
    }

    #[test]
    fn should_render_sections_in_order() {
        let (table, gateway, findings) = sample();
        let text = render(&table, &gateway, &findings);
        let gw = text.find("Default gateway: 192.168.1.1 (MAC: aa:bb:cc:dd:ee:ff)").unwrap();
        let header = text.find("IP Address      MAC Address          Interface").unwrap();
        let row = text.find("192.168.1.3     aa:bb:cc:11:22:33    eth0\n").unwrap();
        let analysis = text.find("Spoofing analysis:").unwrap();
        let shared = text.find("Info: aa:bb:cc:11:22:33 is shared by 2 addresses").unwrap();
        let broadcast = text.find("Info: broadcast hardware address: IP=192.168.1.255").unwrap();
        let summary = text.find("Summary:").unwrap();
        assert!(gw < header && header < row && row < analysis && analysis < shared && shared < broadcast && broadcast < summary);
        assert!(text.contains("Total entries: 4\n"));
        assert!(text.contains("Total findings: 2\n"));
        assert!(text.contains("Suspicious findings: 0\n"));
        assert!(text.contains("- Broadcast hardware addresses: 1\n"));
        assert!(text.contains("- Shared hardware addresses (likely router/AP): 1\n"));
        assert!(text.contains("Your network looks safe for now."));
    }

    #[test]
    fn should_render_empty_scan() {
        let text = render(&AddressTable::default(), &Gateway::Unknown, &[]);
        assert!(text.contains("Default gateway: unknown (MAC: unknown)"));
        assert!(text.contains("No suspicious activity detected."));
        assert!(text.contains("Total entries: 0\n"));
        assert!(text.contains("Total findings: 0\n"));
        assert!(text.contains("Suspicious findings: 0\n"));
        assert!(!text.contains("\n- "));
    }

    #[test]
    fn should_tally_in_canonical_order() {
        let (_, _, findings) = sample();
        let counts: Vec<_> = tally(&findings).into_iter().collect();
        assert_eq!(counts, vec![(Category::InfoBroadcast, 1), (Category::InfoOther, 1)]);
    }
}
