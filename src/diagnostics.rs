//! Startup checks for the VR-side receivers.

use std::fmt;
use std::io::ErrorKind;
use std::net::{ToSocketAddrs, UdpSocket};

use crate::config::NetworkConfig;

/// Result of probing one UDP receiver port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortStatus {
    /// Something is bound to the port, most likely the receiver
    InUse,
    /// Nothing listening; updates will be dropped until a receiver starts
    Free,
    /// The address could not be resolved or probed
    Unknown(String),
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortStatus::InUse => write!(f, "receiver detected"),
            PortStatus::Free => write!(f, "no receiver listening"),
            PortStatus::Unknown(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

/// Tries to bind `addr`. Only meaningful for local addresses.
pub fn probe_udp_port(addr: &str) -> PortStatus {
    let resolved = match addr.to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(a) => a,
            None => return PortStatus::Unknown(format!("{}: no address", addr)),
        },
        Err(e) => return PortStatus::Unknown(format!("{}: {}", addr, e)),
    };
    if !resolved.ip().is_loopback() && !resolved.ip().is_unspecified() {
        return PortStatus::Unknown(format!("{} is not local", resolved));
    }
    match UdpSocket::bind(resolved) {
        Ok(_) => PortStatus::Free,
        Err(e) if e.kind() == ErrorKind::AddrInUse => PortStatus::InUse,
        Err(e) => PortStatus::Unknown(e.to_string()),
    }
}

/// (protocol, address, status) for each enabled output
pub fn probe_outputs(network: &NetworkConfig) -> Vec<(&'static str, String, PortStatus)> {
    let mut results = Vec::new();
    if network.use_vmt {
        results.push(("VMT", network.vmt_addr.clone(), probe_udp_port(&network.vmt_addr)));
    }
    if network.use_vmc {
        results.push(("VMC", network.vmc_addr.clone(), probe_udp_port(&network.vmc_addr)));
    }
    for (name, addr, status) in &results {
        match status {
            PortStatus::InUse => tracing::info!("{} {}: {}", name, addr, status),
            _ => tracing::warn!("{} {}: {}", name, addr, status),
        }
    }
    results
}
