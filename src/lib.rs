//! Passive ARP spoofing detection over the host's ARP table.
//!
//! A scan reads the ARP table ([`arp`]), resolves the default gateway
//! against that snapshot ([`gateway`]), classifies entries ([`classify`]),
//! applies the duplicate-mapping and gateway-integrity rules ([`detect`])
//! and renders the result ([`report`]). [`scan::Scanner`] runs the whole
//! pipeline once; [`monitor`] repeats it on a background thread.

pub mod arp;
pub mod classify;
pub mod command;
pub mod detect;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod monitor;
pub mod report;
pub mod scan;
pub mod table;

pub use error::AcquisitionError;
pub use scan::{ScanReport, Scanner};
