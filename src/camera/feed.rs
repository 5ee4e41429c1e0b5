//! Landmark source fed by an external vision-model process.
//!
//! Each UDP datagram carries one camera frame's worth of landmarks as JSON:
//!
//! ```json
//! { "pose": { "score": 0.93, "landmarks": [ {"x":0.5,"y":0.2,"z":-0.1,"visibility":0.99} ] },
//!   "hands": [ { "handedness": "Left", "score": 0.9, "landmarks": [] } ] }
//! ```

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::{Frame, FrameSource};
use crate::config::{CameraConfig, TrackingConfig};
use crate::error::CameraError;
use crate::pose::{HandLandmarks, PoseEstimator, PoseLandmarks};

/// 受信バッファサイズ（UDPデータグラム最大長）
const MAX_PACKET_SIZE: usize = 65_507;

/// One decoded datagram
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedPacket {
    #[serde(default)]
    pub pose: Option<PoseLandmarks>,
    #[serde(default)]
    pub hands: Vec<HandLandmarks>,
}

impl FeedPacket {
    pub fn from_slice(data: &[u8]) -> Result<Self, CameraError> {
        serde_json::from_slice(data).map_err(|e| CameraError::Decode(e.to_string()))
    }
}

impl Frame for FeedPacket {
    fn flip_horizontal(&mut self) {
        if let Some(pose) = self.pose.as_mut() {
            pose.mirror();
        }
        for hand in &mut self.hands {
            hand.mirror();
        }
    }
}

/// UDP receiver standing in for the camera
pub struct LandmarkFeed {
    addr: String,
    read_timeout: Duration,
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
    /// Packet consumed while confirming a reacquired producer
    pending: Option<FeedPacket>,
}

impl LandmarkFeed {
    pub fn open(addr: &str, read_timeout: Duration) -> Result<Self, CameraError> {
        let mut feed = Self {
            addr: addr.to_string(),
            read_timeout,
            socket: None,
            buf: vec![0u8; MAX_PACKET_SIZE],
            pending: None,
        };
        feed.bind()?;
        Ok(feed)
    }

    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        Self::open(&config.feed_addr, Duration::from_millis(config.read_timeout_ms.max(1)))
    }

    /// Bound address, if the socket is held
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn bind(&mut self) -> Result<(), CameraError> {
        self.socket = None;
        let socket = UdpSocket::bind(&self.addr)
            .map_err(|e| CameraError::Unavailable(format!("{}: {}", self.addr, e)))?;
        socket
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|e| CameraError::Unavailable(e.to_string()))?;
        tracing::info!("Landmark feed listening on {}", self.addr);
        self.socket = Some(socket);
        Ok(())
    }

    fn recv_packet(&mut self) -> Result<FeedPacket, CameraError> {
        let socket = self.socket.as_ref().ok_or(CameraError::Released)?;
        let len = match socket.recv(&mut self.buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(CameraError::NoFrame);
            }
            Err(e) => return Err(CameraError::ReadFailed(e.to_string())),
        };
        FeedPacket::from_slice(&self.buf[..len])
    }
}

impl FrameSource for LandmarkFeed {
    type Frame = FeedPacket;

    fn read_frame(&mut self) -> Result<FeedPacket, CameraError> {
        if let Some(packet) = self.pending.take() {
            return Ok(packet);
        }
        self.recv_packet()
    }

    fn release(&mut self) {
        self.pending = None;
        if self.socket.take().is_some() {
            tracing::debug!("Landmark feed released: {}", self.addr);
        }
    }

    /// Rebinds and waits up to one read timeout for a decodable packet.
    /// A bound socket with no producer behind it is not a recovered camera.
    fn reacquire(&mut self) -> Result<(), CameraError> {
        self.pending = None;
        self.bind()?;
        let deadline = Instant::now() + self.read_timeout;
        loop {
            match self.recv_packet() {
                Ok(packet) => {
                    self.pending = Some(packet);
                    return Ok(());
                }
                Err(CameraError::Decode(e)) if Instant::now() < deadline => {
                    tracing::debug!("Discarding undecodable packet: {}", e);
                }
                Err(e) => {
                    self.socket = None;
                    return Err(CameraError::Unavailable(format!("{}: no producer ({})", self.addr, e)));
                }
            }
        }
    }
}

/// Confidence gating over landmarks that arrive already estimated.
///
/// A body must reach `min_detection_confidence` to be picked up and then only
/// `min_tracking_confidence` to stay tracked.
#[derive(Debug, Clone)]
pub struct PacketEstimator {
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    hand_confidence: f32,
    tracking: bool,
}

impl PacketEstimator {
    pub fn new(min_detection_confidence: f32, min_tracking_confidence: f32, hand_confidence: f32) -> Self {
        Self {
            min_detection_confidence,
            min_tracking_confidence,
            hand_confidence,
            tracking: false,
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(
            config.min_detection_confidence,
            config.min_tracking_confidence,
            config.hand_confidence,
        )
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }
}

impl PoseEstimator<FeedPacket> for PacketEstimator {
    fn estimate_pose(&mut self, frame: &FeedPacket) -> Option<PoseLandmarks> {
        let threshold = if self.tracking {
            self.min_tracking_confidence
        } else {
            self.min_detection_confidence
        };
        let pose = frame
            .pose
            .as_ref()
            .filter(|p| p.is_complete() && p.score >= threshold)
            .cloned();
        self.tracking = pose.is_some();
        pose
    }

    fn estimate_hands(&mut self, frame: &FeedPacket) -> Vec<HandLandmarks> {
        frame
            .hands
            .iter()
            .filter(|h| h.is_complete() && h.score >= self.hand_confidence)
            .cloned()
            .collect()
    }
}
