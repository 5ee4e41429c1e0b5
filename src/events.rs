//! Outbound notifications from the tracking worker to the presentation layer.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use crate::quality::QualityStats;

/// Default queue depth; events beyond it are dropped, never waited on.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    System,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn tag(self) -> &'static str {
        match self {
            LogLevel::System => "SYS",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    Tracking,
    Searching,
    Paused,
    Calibrating { percent: u8 },
    CameraLost,
    /// Reconnection attempts exhausted; the loop idles until stopped.
    CameraFailed,
}

impl TrackingStatus {
    /// Display color (hex RGB)
    pub fn color(self) -> &'static str {
        match self {
            TrackingStatus::Tracking => "#a8ffbc",
            TrackingStatus::Searching => "#ffaa00",
            TrackingStatus::Paused => "#8a8a8a",
            TrackingStatus::Calibrating { .. } => "#00d4ff",
            TrackingStatus::CameraLost | TrackingStatus::CameraFailed => "#ff5555",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingStatus::Tracking => write!(f, "TRACKING"),
            TrackingStatus::Searching => write!(f, "SEARCHING"),
            TrackingStatus::Paused => write!(f, "PAUSED"),
            TrackingStatus::Calibrating { percent } => write!(f, "CALIBRATING {}%", percent),
            TrackingStatus::CameraLost => write!(f, "CAMERA LOST"),
            TrackingStatus::CameraFailed => write!(f, "CAMERA FAILED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationFailure {
    /// No valid frame landed inside the sampling window
    NoSamples,
    /// Head-to-foot span too small (user not fully in frame, or inverted)
    DegenerateHeight(f32),
    Cancelled,
}

impl fmt::Display for CalibrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationFailure::NoSamples => write!(f, "no body detected during sampling"),
            CalibrationFailure::DegenerateHeight(h) => {
                write!(f, "body height {:.3} too small, stand fully in frame", h)
            }
            CalibrationFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationEvent {
    Started,
    Progress { percent: u8 },
    Complete {
        scale: f32,
        offset_x: f32,
        offset_y: f32,
        offset_z: f32,
    },
    Failed { reason: CalibrationFailure },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Status(TrackingStatus),
    Fps(u32),
    Calibration(CalibrationEvent),
    Log { level: LogLevel, message: String },
    Quality(QualityStats),
    CameraLost,
    CameraRestored,
}

/// Non-blocking producer half held by the worker
pub struct EventSender {
    tx: SyncSender<EngineEvent>,
    dropped: u64,
}

impl EventSender {
    pub fn emit(&mut self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped.is_power_of_two() {
                    tracing::debug!("Event queue full, {} events dropped so far", self.dropped);
                }
            }
            // 受信側がいなくても処理は続ける
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Emits a log line for the presentation layer and mirrors it to tracing.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::System | LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        self.emit(EngineEvent::Log { level, message });
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

pub fn event_channel(capacity: usize) -> (EventSender, Receiver<EngineEvent>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (EventSender { tx, dropped: 0 }, rx)
}
