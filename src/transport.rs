use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::config::NetworkConfig;
use crate::error::TransportError;
use crate::vmt::{self, TrackerPose};
use crate::vmc;

/// One tracker's output for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate<'a> {
    /// VMT tracker index
    pub index: i32,
    /// VMC bone name
    pub bone: &'a str,
    pub enabled: bool,
    pub pose: TrackerPose,
}

impl TrackerUpdate<'_> {
    pub fn encode_vmt(&self) -> Result<Vec<u8>, TransportError> {
        vmt::encode_osc_message(vmt::build_osc_message(self.index, self.enabled, &self.pose))
    }

    pub fn encode_vmc(&self) -> Result<Vec<u8>, TransportError> {
        vmt::encode_osc_message(vmc::build_osc_message(self.bone, &self.pose))
    }
}

/// Destination for per-frame tracker updates.
///
/// Implementations must not fail the caller: a lost update is superseded by
/// the next frame.
pub trait UpdateSink {
    fn send(&mut self, update: &TrackerUpdate<'_>);
}

struct Endpoint {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Endpoint {
    fn open(target: &str) -> Result<Self, TransportError> {
        let target = target
            .to_socket_addrs()
            .map_err(|e| TransportError::Bind(format!("{}: {}", target, e)))?
            .next()
            .ok_or_else(|| TransportError::Bind(format!("{}: no address resolved", target)))?;
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        Ok(Self { socket, target })
    }

    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(data, self.target)
            .map(|_| ())
            .map_err(|e| TransportError::Send {
                addr: self.target.to_string(),
                message: e.to_string(),
            })
    }
}

/// Fire-and-forget OSC sender for VMT and, optionally, VMC
pub struct OscTransport {
    vmt: Option<Endpoint>,
    vmc: Option<Endpoint>,
    send_errors: u64,
}

impl OscTransport {
    pub fn new(network: &NetworkConfig) -> Result<Self, TransportError> {
        let vmt = if network.use_vmt {
            let endpoint = Endpoint::open(&network.vmt_addr)?;
            tracing::info!("VMT client ready: {}", endpoint.target);
            Some(endpoint)
        } else {
            None
        };
        let vmc = if network.use_vmc {
            let endpoint = Endpoint::open(&network.vmc_addr)?;
            tracing::info!("VMC client ready: {}", endpoint.target);
            Some(endpoint)
        } else {
            None
        };
        Ok(Self {
            vmt,
            vmc,
            send_errors: 0,
        })
    }

    pub fn vmt_enabled(&self) -> bool {
        self.vmt.is_some()
    }

    pub fn vmc_enabled(&self) -> bool {
        self.vmc.is_some()
    }

    /// Number of absorbed send/encode failures since creation
    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }

    pub fn send_vmt(&mut self, update: &TrackerUpdate<'_>) {
        let Some(endpoint) = &self.vmt else { return };
        if let Err(e) = update.encode_vmt().and_then(|data| endpoint.send(&data)) {
            self.send_errors += 1;
            tracing::debug!("VMT send error: {}", e);
        }
    }

    pub fn send_vmc(&mut self, update: &TrackerUpdate<'_>) {
        let Some(endpoint) = &self.vmc else { return };
        if let Err(e) = update.encode_vmc().and_then(|data| endpoint.send(&data)) {
            self.send_errors += 1;
            tracing::debug!("VMC send error: {}", e);
        }
    }
}

impl UpdateSink for OscTransport {
    fn send(&mut self, update: &TrackerUpdate<'_>) {
        self.send_vmt(update);
        self.send_vmc(update);
    }
}
