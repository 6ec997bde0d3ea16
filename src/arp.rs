use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command;
use crate::error::AcquisitionError;
use crate::table::{AddressEntry, AddressTable, HwAddr};

// https://github.com/prometheus/node_exporter/blob/master/collector/arp_linux.go
// https://github.com/prometheus/procfs/blob/master/arp.go

pub const PROC_NET_ARP: &str = "/proc/net/arp";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

// ATF_COM from <net/if_arp.h>
const ATF_COMPLETE: u32 = 0x2;

/// Something that can produce a snapshot of the ARP table.
pub trait TableSource: Send + Sync {
    fn acquire(&self) -> Result<AddressTable, AcquisitionError>;

    fn name(&self) -> &'static str;
}

/// Reads the Linux kernel ARP cache from procfs.
#[derive(Clone, Debug)]
pub struct ProcNetArp {
    path: PathBuf,
}

impl ProcNetArp {
    pub fn new() -> Self {
        Self { path: PathBuf::from(PROC_NET_ARP) }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ProcNetArp {
    fn default() -> Self {
        Self::new()
    }
}

impl TableSource for ProcNetArp {
    fn acquire(&self) -> Result<AddressTable, AcquisitionError> {
        log::debug!("Reading ARP table from {}", self.path.display());
        let content = std::fs::read_to_string(&self.path)
            .map_err(|source| AcquisitionError::Io { path: self.path.display().to_string(), source })?;
        parse_proc_net_arp(&content)
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}

// IP address       HW type     Flags       HW address            Mask     Device
// 192.168.1.15     0x1         0x0         00:00:00:00:00:00     *        lan
// 192.168.1.106    0x1         0x2         90:11:95:3e:cf:5d     *        lan
pub fn parse_proc_net_arp(content: &str) -> Result<AddressTable, AcquisitionError> {
    let mut lines = content.lines();
    match lines.next() {
        Some(header) if header.trim_start().starts_with("IP address") => {}
        Some(header) => return Err(AcquisitionError::Format(format!("unexpected procfs header {:?}", header.trim()))),
        None => return Err(AcquisitionError::Format("empty procfs ARP table".to_string())),
    }

    let mut entries = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let arr: Vec<&str> = line.split_whitespace().collect();
        if arr.len() != 6 {
            return Err(AcquisitionError::Format(format!("expected 6 columns, got {}: {:?}", arr.len(), line)));
        }
        let flags = u32::from_str_radix(arr[2].trim_start_matches("0x"), 16)
            .map_err(|_| AcquisitionError::Format(format!("invalid flags {:?} in {:?}", arr[2], line)))?;
        if flags & ATF_COMPLETE == 0 {
            log::debug!("Skipping incomplete entry {}", arr[0]);
            continue;
        }
        match AddressEntry::parse(arr[0], arr[3], arr[5]) {
            Some(entry) => entries.push(entry),
            None => log::debug!("Skipping malformed entry {:?}", line),
        }
    }
    Ok(AddressTable::new(entries))
}

/// Output grammar of the platform `arp` tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpDialect {
    /// net-tools `arp -n` and BSD/macOS `arp -an`.
    Posix,
    /// Windows `arp -a`.
    Windows,
}

/// Runs the platform `arp` tool and parses its output.
#[derive(Clone, Debug)]
pub struct ArpCommand {
    dialect: ArpDialect,
    timeout: Duration,
}

impl ArpCommand {
    pub fn new(dialect: ArpDialect, timeout: Duration) -> Self {
        Self { dialect, timeout }
    }

    pub fn for_platform(timeout: Duration) -> Self {
        let dialect = if cfg!(windows) { ArpDialect::Windows } else { ArpDialect::Posix };
        Self::new(dialect, timeout)
    }

    fn args(&self) -> &'static [&'static str] {
        match self.dialect {
            ArpDialect::Windows => &["-a"],
            ArpDialect::Posix if cfg!(target_os = "linux") => &["-n"],
            ArpDialect::Posix => &["-an"],
        }
    }
}

impl TableSource for ArpCommand {
    fn acquire(&self) -> Result<AddressTable, AcquisitionError> {
        let output = command::run("arp", self.args(), self.timeout)?;
        match self.dialect {
            ArpDialect::Posix => parse_arp_posix(&output),
            ArpDialect::Windows => parse_arp_windows(&output),
        }
    }

    fn name(&self) -> &'static str {
        "arp"
    }
}

fn is_incomplete(token: &str) -> bool {
    token.eq_ignore_ascii_case("(incomplete)") || token.eq_ignore_ascii_case("incomplete")
}

// Address                  HWtype  HWaddress           Flags Mask            Iface
// 192.168.1.1              ether   aa:bb:cc:dd:ee:ff   C                     eth0
// 192.168.1.7                      (incomplete)                              eth0
//
// ? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]
// ? (192.168.1.9) at (incomplete) on en0 ifscope [ethernet]
pub fn parse_arp_posix(output: &str) -> Result<AddressTable, AcquisitionError> {
    let mut entries = Vec::new();
    let mut recognized = false;

    for line in output.lines() {
        let arr: Vec<&str> = line.split_whitespace().collect();
        if arr.is_empty() {
            continue;
        }
        if arr[0] == "Address" {
            recognized = true;
            continue;
        }

        // BSD style
        if let Some(at) = arr.iter().position(|t| *t == "at") {
            let Some(ip) = at.checked_sub(1).and_then(|i| arr.get(i)).map(|t| t.trim_start_matches('(').trim_end_matches(')')) else {
                continue;
            };
            if ip.parse::<Ipv4Addr>().is_err() {
                continue;
            }
            recognized = true;
            let hw = arr.get(at + 1).copied().unwrap_or_default();
            if is_incomplete(hw) {
                continue;
            }
            let iface = arr.iter().position(|t| *t == "on").and_then(|on| arr.get(on + 1)).copied().unwrap_or("unknown");
            match AddressEntry::parse(ip, hw, iface) {
                Some(entry) => entries.push(entry),
                None => log::debug!("Skipping malformed entry {:?}", line),
            }
            continue;
        }

        // net-tools style
        if arr[0].parse::<Ipv4Addr>().is_err() {
            continue;
        }
        recognized = true;
        if arr.iter().any(|t| is_incomplete(t)) {
            continue;
        }
        let Some(hw) = arr.iter().skip(1).find(|t| t.parse::<HwAddr>().is_ok()) else {
            log::debug!("Skipping entry without hardware address {:?}", line);
            continue;
        };
        let iface = if arr.len() > 3 { arr[arr.len() - 1] } else { "unknown" };
        match AddressEntry::parse(arr[0], hw, iface) {
            Some(entry) => entries.push(entry),
            None => log::debug!("Skipping malformed entry {:?}", line),
        }
    }

    if !recognized && !output.trim().is_empty() {
        return Err(AcquisitionError::Format("unrecognized arp output".to_string()));
    }
    Ok(AddressTable::new(entries))
}

// Interface: 192.168.1.10 --- 0xb
//   Internet Address      Physical Address      Type
//   192.168.1.1           aa-bb-cc-dd-ee-ff     dynamic
pub fn parse_arp_windows(output: &str) -> Result<AddressTable, AcquisitionError> {
    let mut entries = Vec::new();
    let mut recognized = false;

    for line in output.lines() {
        let arr: Vec<&str> = line.split_whitespace().collect();
        if arr.is_empty() {
            continue;
        }
        if arr[0].ends_with(':') || arr[0] == "Internet" || line.trim() == "No ARP Entries Found." {
            recognized = true;
            continue;
        }
        if arr.len() < 3 || arr[0].parse::<Ipv4Addr>().is_err() {
            continue;
        }
        recognized = true;
        if is_incomplete(arr[1]) {
            continue;
        }
        match AddressEntry::parse(arr[0], arr[1], arr[2]) {
            Some(entry) => entries.push(entry),
            None => log::debug!("Skipping malformed entry {:?}", line),
        }
    }

    if !recognized && !output.trim().is_empty() {
        return Err(AcquisitionError::Format("unrecognized arp output".to_string()));
    }
    Ok(AddressTable::new(entries))
}

/// Reads the live table the way the current platform allows: procfs on
/// Linux when present, the `arp` tool otherwise.
#[derive(Clone, Debug)]
pub struct SystemSource {
    procfs: ProcNetArp,
    command: ArpCommand,
}

impl SystemSource {
    pub fn new(timeout: Duration) -> Self {
        Self { procfs: ProcNetArp::new(), command: ArpCommand::for_platform(timeout) }
    }
}

impl TableSource for SystemSource {
    fn acquire(&self) -> Result<AddressTable, AcquisitionError> {
        if cfg!(target_os = "linux") && self.procfs.path().exists() {
            return self.procfs.acquire();
        }
        self.command.acquire()
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Fixed demo data. Only ever used when explicitly selected.
#[derive(Clone, Debug)]
pub struct FixtureSource {
    table: AddressTable,
}

impl FixtureSource {
    pub fn new(table: AddressTable) -> Self {
        Self { table }
    }

    /// Gateway, a regular host, one hardware address shared by two hosts,
    /// and a broadcast entry.
    pub fn demo() -> Self {
        let entry = |ip: [u8; 4], mac: [u8; 6]| AddressEntry::new(Ipv4Addr::from(ip), HwAddr(mac), "eth0");
        Self::new(AddressTable::new(vec![
            entry([192, 168, 1, 1], [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            entry([192, 168, 1, 2], [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            entry([192, 168, 1, 3], [0xaa, 0xbb, 0xcc, 0x11, 0x22, 0x33]),
            entry([192, 168, 1, 4], [0xaa, 0xbb, 0xcc, 0x11, 0x22, 0x33]),
            entry([192, 168, 1, 5], [0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
        ]))
    }
}

impl TableSource for FixtureSource {
    fn acquire(&self) -> Result<AddressTable, AcquisitionError> {
        Ok(self.table.clone())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
