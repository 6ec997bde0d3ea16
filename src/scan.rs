use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Serialize;

use crate::arp::{FixtureSource, TableSource};
use crate::detect::{Detector, DetectorConfig, Finding};
use crate::error::AcquisitionError;
use crate::gateway::{Gateway, GatewayResolver, RouteSource, StaticRoute};
use crate::report;
use crate::table::AddressTable;

pub const DEMO_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

/// Everything one scan produced.
#[derive(Clone, Debug, Serialize)]
pub struct ScanReport {
    pub table: AddressTable,
    pub gateway: Gateway,
    pub findings: Vec<Finding>,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&humantime::format_duration(*d))
}

impl ScanReport {
    pub fn render(&self) -> String {
        report::render(&self.table, &self.gateway, &self.findings)
    }

    pub fn suspicious_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_suspicious()).count()
    }

    pub fn is_suspicious(&self) -> bool {
        self.suspicious_count() > 0
    }
}

/// The detection pipeline: acquire, resolve the gateway against the same
/// snapshot, detect.
pub struct Scanner {
    source: Box<dyn TableSource>,
    resolver: GatewayResolver,
    detector: Detector,
}

impl Scanner {
    pub fn new(source: Box<dyn TableSource>, routes: Box<dyn RouteSource>, config: DetectorConfig) -> Self {
        Self { source, resolver: GatewayResolver::new(routes), detector: Detector::new(config) }
    }

    /// Fixture data with a fixed gateway. Never touches the OS.
    pub fn demo(config: DetectorConfig) -> Self {
        Self::new(Box::new(FixtureSource::demo()), Box::new(StaticRoute(DEMO_GATEWAY)), config)
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn scan(&self) -> Result<ScanReport, AcquisitionError> {
        let started = std::time::Instant::now();
        let table = self.source.acquire()?;
        log::debug!("Acquired {} ARP entries from {}", table.len(), self.source.name());
        let gateway = self.resolver.resolve(&table);
        let findings = self.detector.detect(&table, &gateway);
        Ok(ScanReport { table, gateway, findings, elapsed: started.elapsed() })
    }
}
