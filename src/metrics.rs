use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

use crate::detect::Category;
use crate::error::AcquisitionError;
use crate::report::tally;
use crate::scan::ScanReport;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ArpEntryLabels {
    ip_addr: String,
    hw_addr: String,
    device: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FindingLabels {
    category: String,
    severity: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FailureLabels {
    reason: String,
}

/// Prometheus view of the most recent scan.
#[derive(Default, Clone)]
pub struct ScanMetrics {
    table_entries: Gauge,
    arp_entries: Family<ArpEntryLabels, Gauge>,
    findings: Family<FindingLabels, Gauge>,
    gateway_resolved: Gauge,
    scans_total: Counter,
    scan_failures_total: Family<FailureLabels, Counter>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register("arp_sentinel_table_entries", "Entries in the last ARP table snapshot", self.table_entries.clone());
        registry.register("arp_sentinel_arp_entries", "ARP cache", self.arp_entries.clone());
        registry.register("arp_sentinel_findings", "Findings of the last scan", self.findings.clone());
        registry.register("arp_sentinel_gateway_resolved", "Whether the default gateway was resolved", self.gateway_resolved.clone());
        registry.register("arp_sentinel_scans", "Completed scans", self.scans_total.clone());
        registry.register("arp_sentinel_scan_failures", "Scans that could not read the ARP table", self.scan_failures_total.clone());
    }

    pub fn record_scan(&self, report: &ScanReport) {
        self.scans_total.inc();
        self.table_entries.set(report.table.len() as i64);
        self.gateway_resolved.set(report.gateway.is_known() as i64);

        self.arp_entries.clear();
        for entry in &report.table {
            self.arp_entries
                .get_or_create(&ArpEntryLabels {
                    ip_addr: entry.network_address.to_string(),
                    hw_addr: entry.hardware_address.to_string(),
                    device: entry.interface_label.clone(),
                })
                .set(1);
        }

        let counts = tally(&report.findings);
        for category in Category::ALL {
            let labels = FindingLabels { category: category.to_string(), severity: category.severity().to_string() };
            self.findings.get_or_create(&labels).set(counts.get(&category).copied().unwrap_or(0) as i64);
        }
    }

    pub fn record_failure(&self, err: &AcquisitionError) {
        self.scan_failures_total.get_or_create(&FailureLabels { reason: err.reason().to_string() }).inc();
    }
}

#[cfg(test)]
mod tests {
    use prometheus_client::encoding::text::encode;

    use super::*;
    use crate::detect::DetectorConfig;
    use crate::scan::Scanner;

    fn encoded(metrics: &ScanMetrics) -> String {
        let mut registry = Registry::default();
        metrics.register(&mut registry);
        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        buffer
    }

    #[test]
    fn should_export_last_scan() {
        let metrics = ScanMetrics::new();
        let report = Scanner::demo(DetectorConfig::default()).scan().unwrap();
        metrics.record_scan(&report);
        let text = encoded(&metrics);
        assert!(text.contains("arp_sentinel_table_entries 5"));
        assert!(text.contains("arp_sentinel_gateway_resolved 1"));
        assert!(text.contains("arp_sentinel_scans_total 1"));
        assert!(text.contains(r#"arp_sentinel_findings{category="info-other",severity="info"} 1"#));
        assert!(text.contains(r#"arp_sentinel_findings{category="gateway-multi-hardware",severity="critical"} 0"#));
        assert!(text.contains(r#"arp_sentinel_arp_entries{ip_addr="192.168.1.5",hw_addr="ff:ff:ff:ff:ff:ff",device="eth0"} 1"#));
    }

    #[test]
    fn should_count_failures_by_reason() {
        let metrics = ScanMetrics::new();
        metrics.record_failure(&AcquisitionError::Format("drift".to_string()));
        metrics.record_failure(&AcquisitionError::Format("drift".to_string()));
        let text = encoded(&metrics);
        assert!(text.contains(r#"arp_sentinel_scan_failures_total{reason="format"} 2"#));
    }
}
