use std::thread;
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::config::{secs_or, WatchdogConfig};

const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Result of one reconnection step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Source reacquired; watchdog state was reset.
    Restored,
    /// Attempt `attempt` of `max_retries` failed.
    Failed { attempt: u32 },
    /// No attempts left for this failure episode; nothing was tried.
    Exhausted,
}

/// Detects frame-delivery stalls and drives bounded reconnection
#[derive(Debug)]
pub struct CameraWatchdog {
    last_frame_time: Option<Instant>,
    retry_count: u32,
    max_retries: u32,
    retry_delay: Duration,
    frame_timeout: Duration,
    disconnected: bool,
}

impl CameraWatchdog {
    pub fn new(frame_timeout: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            last_frame_time: None,
            retry_count: 0,
            max_retries,
            retry_delay,
            frame_timeout,
            disconnected: false,
        }
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(
            secs_or(config.frame_timeout_secs, DEFAULT_FRAME_TIMEOUT),
            config.max_retries,
            secs_or(config.retry_delay_secs, DEFAULT_RETRY_DELAY),
        )
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Starts the stall window without a frame, so a source that never
    /// delivers is still detected.
    pub fn arm(&mut self, now: Instant) {
        self.last_frame_time = Some(now);
    }

    /// Returns true when this frame ends a lost-camera episode.
    pub fn record_frame(&mut self, now: Instant) -> bool {
        self.last_frame_time = Some(now);
        if self.disconnected {
            self.disconnected = false;
            self.retry_count = 0;
            return true;
        }
        false
    }

    pub fn check_timeout(&self, now: Instant) -> bool {
        match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last) > self.frame_timeout,
            None => false,
        }
    }

    /// Marks the camera lost. True only for the first call of an episode.
    pub fn mark_lost(&mut self) -> bool {
        if self.disconnected {
            return false;
        }
        self.disconnected = true;
        true
    }

    /// Release, wait `retry_delay`, reacquire. Counts the attempt whether or
    /// not it succeeds.
    pub fn try_reconnect<S: FrameSource>(&mut self, source: &mut S) -> Reconnect {
        if self.is_exhausted() {
            return Reconnect::Exhausted;
        }
        self.retry_count += 1;
        tracing::warn!("Camera retry {}/{}", self.retry_count, self.max_retries);

        source.release();
        if !self.retry_delay.is_zero() {
            thread::sleep(self.retry_delay);
        }
        match source.reacquire() {
            Ok(()) => {
                self.reset(Instant::now());
                Reconnect::Restored
            }
            Err(e) => {
                tracing::warn!("Camera reacquire failed: {}", e);
                Reconnect::Failed {
                    attempt: self.retry_count,
                }
            }
        }
    }

    /// Clears the failure episode and restarts the stall window at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.retry_count = 0;
        self.disconnected = false;
        self.last_frame_time = Some(now);
    }
}

impl Default for CameraWatchdog {
    fn default() -> Self {
        Self::from_config(&WatchdogConfig::default())
    }
}
