//! Default gateway discovery.
//!
//! The next hop is read from the routing configuration, then its hardware
//! address is looked up in the ARP table snapshot taken for the same scan.
//! Every failure degrades to [`Gateway::Unknown`].

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::command;
use crate::error::RouteError;
use crate::table::{AddressTable, HwAddr};

pub const PROC_NET_ROUTE: &str = "/proc/net/route";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Gateway {
    Known { network_address: Ipv4Addr, hardware_address: HwAddr },
    Unknown,
}

impl Gateway {
    pub fn network_address(&self) -> Option<Ipv4Addr> {
        match self {
            Gateway::Known { network_address, .. } => Some(*network_address),
            Gateway::Unknown => None,
        }
    }

    pub fn hardware_address(&self) -> Option<HwAddr> {
        match self {
            Gateway::Known { hardware_address, .. } => Some(*hardware_address),
            Gateway::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Gateway::Known { .. })
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gateway::Known { network_address, hardware_address } => write!(f, "{} (MAC: {})", network_address, hardware_address),
            Gateway::Unknown => write!(f, "unknown (MAC: unknown)"),
        }
    }
}

/// Something that knows the default route's next hop.
pub trait RouteSource: Send + Sync {
    fn default_gateway(&self) -> Result<Ipv4Addr, RouteError>;
}

/// Linux `/proc/net/route`.
#[derive(Clone, Debug)]
pub struct ProcNetRoute {
    path: PathBuf,
}

impl ProcNetRoute {
    pub fn new() -> Self {
        Self { path: PathBuf::from(PROC_NET_ROUTE) }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcNetRoute {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteSource for ProcNetRoute {
    fn default_gateway(&self) -> Result<Ipv4Addr, RouteError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|source| RouteError::Io { path: self.path.display().to_string(), source })?;
        parse_proc_net_route(&content)
    }
}

// Iface  Destination  Gateway   Flags  RefCnt  Use  Metric  Mask      MTU  Window  IRTT
// eth0   00000000     0101A8C0  0003   0       0    100     00000000  0    0       0
pub fn parse_proc_net_route(content: &str) -> Result<Ipv4Addr, RouteError> {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            continue;
        }
        // Gateway is hex in host byte order
        let gw = u32::from_str_radix(fields[2], 16).map_err(|_| RouteError::InvalidGateway(fields[2].to_string()))?;
        if gw == 0 {
            continue;
        }
        return Ok(Ipv4Addr::from(gw.to_be()));
    }
    Err(RouteError::NoDefaultRoute)
}

/// `ip route show default`.
#[derive(Clone, Debug)]
pub struct IpRoute {
    timeout: Duration,
}

impl IpRoute {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RouteSource for IpRoute {
    fn default_gateway(&self) -> Result<Ipv4Addr, RouteError> {
        let output = command::run("ip", &["-4", "route", "show", "default"], self.timeout)?;
        parse_ip_route(&output)
    }
}

// default via 192.168.1.1 dev eth0 proto dhcp metric 100
pub fn parse_ip_route(output: &str) -> Result<Ipv4Addr, RouteError> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 3 && fields[0] == "default" && fields[1] == "via" {
            return fields[2].parse().map_err(|_| RouteError::InvalidGateway(fields[2].to_string()));
        }
    }
    Err(RouteError::NoDefaultRoute)
}

/// macOS `netstat -rn -f inet`.
#[derive(Clone, Debug)]
pub struct Netstat {
    timeout: Duration,
}

impl Netstat {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RouteSource for Netstat {
    fn default_gateway(&self) -> Result<Ipv4Addr, RouteError> {
        let output = command::run("netstat", &["-rn", "-f", "inet"], self.timeout)?;
        parse_netstat(&output)
    }
}

// Destination        Gateway            Flags           Netif Expire
// default            192.168.1.1        UGScg             en0
pub fn parse_netstat(output: &str) -> Result<Ipv4Addr, RouteError> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[0] == "default" {
            // Link-level gateways ("link#4") are not IPv4 next hops
            if let Ok(ip) = fields[1].parse() {
                return Ok(ip);
            }
        }
    }
    Err(RouteError::NoDefaultRoute)
}

/// Windows `ipconfig`.
#[derive(Clone, Debug)]
pub struct Ipconfig {
    timeout: Duration,
}

impl Ipconfig {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RouteSource for Ipconfig {
    fn default_gateway(&self) -> Result<Ipv4Addr, RouteError> {
        let output = command::run("ipconfig", &[], self.timeout)?;
        parse_ipconfig(&output)
    }
}

//    Default Gateway . . . . . . . . . : fe80::1%11
//                                        192.168.1.1
pub fn parse_ipconfig(output: &str) -> Result<Ipv4Addr, RouteError> {
    let mut in_gateway = false;
    for line in output.lines() {
        let value = if line.contains("Default Gateway") {
            in_gateway = true;
            line.split_once(": ").map(|(_, v)| v).unwrap_or_default()
        } else if in_gateway && !line.contains(": ") && !line.trim().is_empty() {
            line
        } else {
            in_gateway = false;
            continue;
        };
        if let Ok(ip) = value.trim().parse() {
            return Ok(ip);
        }
    }
    Err(RouteError::NoDefaultRoute)
}

/// A fixed next hop, for demo mode or an operator override.
#[derive(Clone, Copy, Debug)]
pub struct StaticRoute(pub Ipv4Addr);

impl RouteSource for StaticRoute {
    fn default_gateway(&self) -> Result<Ipv4Addr, RouteError> {
        Ok(self.0)
    }
}

/// The platform's native route lookup.
#[derive(Clone, Debug)]
pub struct SystemRoute {
    timeout: Duration,
}

impl SystemRoute {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RouteSource for SystemRoute {
    fn default_gateway(&self) -> Result<Ipv4Addr, RouteError> {
        if cfg!(windows) {
            Ipconfig::new(self.timeout).default_gateway()
        } else if cfg!(target_os = "macos") {
            Netstat::new(self.timeout).default_gateway()
        } else {
            ProcNetRoute::new().default_gateway().or_else(|err| {
                log::debug!("procfs route lookup failed ({}), falling back to ip route", err);
                IpRoute::new(self.timeout).default_gateway()
            })
        }
    }
}

pub struct GatewayResolver {
    routes: Box<dyn RouteSource>,
}

impl GatewayResolver {
    pub fn new(routes: Box<dyn RouteSource>) -> Self {
        Self { routes }
    }

    pub fn resolve(&self, table: &AddressTable) -> Gateway {
        let ip = match self.routes.default_gateway() {
            Ok(ip) => ip,
            Err(err) => {
                log::warn!("Could not determine default gateway: {}", err);
                return Gateway::Unknown;
            }
        };
        match table.lookup(ip) {
            Some(entry) => {
                log::debug!("Default gateway {} is at {}", ip, entry.hardware_address);
                Gateway::Known { network_address: ip, hardware_address: entry.hardware_address }
            }
            None => {
                log::warn!("Default gateway {} has no ARP entry", ip);
                Gateway::Unknown
            }
        }
    }
}
