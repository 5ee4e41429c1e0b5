//! Per-frame orchestration and the worker thread that runs it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::calibration::CalibrationController;
use crate::camera::{CameraWatchdog, Frame, FrameSource, Reconnect};
use crate::config::{Config, TrackerSlot, TrackersConfig, TrackingConfig};
use crate::error::{CameraError, Result};
use crate::events::{CalibrationEvent, EngineEvent, EventSender, LogLevel, TrackingStatus};
use crate::pose::{HandLandmarks, LandmarkSample, PoseEstimator, PoseLandmarks};
use crate::quality::QualityMonitor;
use crate::tracker::joints::{hand_channel, hand_joint, hand_landmark, Joint, TrackingMode};
use crate::tracker::mapper::{CoordinateMapper, SharedTransform};
use crate::tracker::one_euro::{ChannelId, FilterBank};
use crate::transport::{TrackerUpdate, UpdateSink};
use crate::vmt::TrackerPose;

/// Frames between quality samples
pub const QUALITY_SAMPLE_INTERVAL: u64 = 30;

/// Sleep between polls of the running flag once the camera has failed for good
const FAILED_IDLE_SLEEP: Duration = Duration::from_millis(100);

/// Control messages from the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartCalibration,
    CancelCalibration,
    Pause,
    Resume,
    SetMode(TrackingMode),
    ResetFilters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// A frame went through estimation and dispatch
    Processed,
    /// A frame arrived while paused
    Paused,
    /// Read returned nothing usable
    NoFrame,
    /// Camera stalled; a reconnection step ran
    Reconnecting,
    /// Retries exhausted
    CameraFailed,
}

/// Owns every per-frame resource; runs on a single thread.
pub struct TrackingLoop<S, E, K>
where
    S: FrameSource,
    E: PoseEstimator<S::Frame>,
    K: UpdateSink,
{
    source: S,
    estimator: E,
    sink: K,
    filters: FilterBank,
    mapper: CoordinateMapper,
    calibration: CalibrationController,
    watchdog: CameraWatchdog,
    quality: QualityMonitor,
    events: EventSender,
    commands: Receiver<Command>,
    trackers: TrackersConfig,
    tracking: TrackingConfig,
    flip: bool,
    paused: bool,
    camera_failed: bool,
    armed: bool,
    status: Option<TrackingStatus>,
    calibration_percent: Option<u8>,
    epoch: Instant,
    last_frame_at: Option<Instant>,
    frame_count: u64,
    confidence_sum: f32,
    confidence_frames: u32,
}

impl<S, E, K> TrackingLoop<S, E, K>
where
    S: FrameSource,
    E: PoseEstimator<S::Frame>,
    K: UpdateSink,
{
    pub fn new(
        config: &Config,
        source: S,
        estimator: E,
        sink: K,
        transform: SharedTransform,
        commands: Receiver<Command>,
        events: EventSender,
    ) -> Self {
        Self {
            source,
            estimator,
            sink,
            filters: FilterBank::new(config.tracking.filter_params()),
            mapper: CoordinateMapper::new(transform),
            calibration: CalibrationController::from_config(&config.calibration),
            watchdog: CameraWatchdog::from_config(&config.watchdog),
            quality: QualityMonitor::default(),
            events,
            commands,
            trackers: config.trackers.clone(),
            tracking: config.tracking.clone(),
            flip: config.camera.flip_horizontal,
            paused: false,
            camera_failed: false,
            armed: false,
            status: None,
            calibration_percent: None,
            epoch: Instant::now(),
            last_frame_at: None,
            frame_count: 0,
            confidence_sum: 0.0,
            confidence_frames: 0,
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.tracking.mode
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn status(&self) -> Option<TrackingStatus> {
        self.status
    }

    pub fn transform(&self) -> &SharedTransform {
        self.mapper.shared()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn filters(&self) -> &FilterBank {
        &self.filters
    }

    /// Runs until `running` is cleared, then releases the source.
    pub fn run(&mut self, running: &AtomicBool) {
        self.events.log(LogLevel::System, format!("Tracking started ({:?})", self.tracking.mode));
        while running.load(Ordering::Relaxed) {
            if self.run_iteration() == IterationOutcome::CameraFailed {
                thread::sleep(FAILED_IDLE_SLEEP);
            }
        }
        self.source.release();
        self.events.log(LogLevel::System, "Tracking stopped");
    }

    pub fn run_iteration(&mut self) -> IterationOutcome {
        self.run_iteration_at(Instant::now())
    }

    /// One loop pass with `now` as the frame clock.
    pub fn run_iteration_at(&mut self, now: Instant) -> IterationOutcome {
        let started = Instant::now();
        self.drain_commands(now);

        if self.camera_failed {
            return IterationOutcome::CameraFailed;
        }
        if !self.armed {
            self.watchdog.arm(now);
            self.armed = true;
        }
        if self.watchdog.check_timeout(now) {
            return self.handle_stall();
        }

        let mut frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(CameraError::NoFrame) => return IterationOutcome::NoFrame,
            Err(e) => {
                tracing::debug!("Frame read error: {}", e);
                return IterationOutcome::NoFrame;
            }
        };

        if self.watchdog.record_frame(now) {
            self.events.emit(EngineEvent::CameraRestored);
            self.events.log(LogLevel::Info, "Camera restored");
        }

        if self.flip {
            frame.flip_horizontal();
        }

        if self.paused {
            self.last_frame_at = Some(now);
            self.set_status(TrackingStatus::Paused);
            return IterationOutcome::Paused;
        }

        let pose = if self.tracking.mode.uses_pose() {
            self.estimator.estimate_pose(&frame)
        } else {
            None
        };
        let hands = if self.tracking.uses_hand_pipeline() {
            self.estimator.estimate_hands(&frame)
        } else {
            Vec::new()
        };

        self.mapper.refresh();
        let t = now.saturating_duration_since(self.epoch).as_secs_f64();
        self.dispatch(t, pose.as_ref(), &hands);

        if self.calibration.is_active() {
            self.advance_calibration(now, pose.as_ref());
        }

        let fps = match self.last_frame_at {
            Some(last) => {
                let dt = now.saturating_duration_since(last).as_secs_f32();
                if dt > 0.0 { 1.0 / dt } else { 0.0 }
            }
            None => 0.0,
        };
        self.last_frame_at = Some(now);
        self.events.emit(EngineEvent::Fps(fps.round() as u32));

        self.confidence_sum += frame_confidence(pose.as_ref(), &hands);
        self.confidence_frames += 1;
        self.frame_count += 1;
        if self.frame_count % QUALITY_SAMPLE_INTERVAL == 0 {
            let confidence = self.confidence_sum / self.confidence_frames.max(1) as f32;
            let latency_ms = started.elapsed().as_secs_f32() * 1000.0;
            self.quality.record(fps, confidence, latency_ms);
            self.confidence_sum = 0.0;
            self.confidence_frames = 0;
            self.events.emit(EngineEvent::Quality(self.quality.stats()));
        }

        let status = match self.calibration_percent {
            Some(percent) if self.calibration.is_active() => TrackingStatus::Calibrating { percent },
            _ if pose.is_some() || !hands.is_empty() => TrackingStatus::Tracking,
            _ => TrackingStatus::Searching,
        };
        self.set_status(status);

        IterationOutcome::Processed
    }

    fn drain_commands(&mut self, now: Instant) {
        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            };
            match command {
                Command::StartCalibration if self.paused => {
                    self.events.log(LogLevel::Warn, "Calibration needs tracking, resume first");
                }
                Command::StartCalibration => {
                    if let Some(event) = self.calibration.start(now) {
                        self.calibration_percent = Some(0);
                        self.events.emit(EngineEvent::Calibration(event));
                        self.events.log(LogLevel::Info, "Calibration started, stand still in full view");
                    }
                }
                Command::CancelCalibration => self.cancel_calibration(),
                Command::Pause => {
                    if !self.paused {
                        self.paused = true;
                        self.cancel_calibration();
                        self.events.log(LogLevel::Info, "Tracking paused");
                    }
                }
                Command::Resume => {
                    if self.paused {
                        self.paused = false;
                        self.filters.reset();
                        self.events.log(LogLevel::Info, "Tracking resumed");
                    }
                }
                Command::SetMode(mode) => {
                    if mode != self.tracking.mode {
                        self.tracking.mode = mode;
                        self.filters.reset();
                        self.events.log(LogLevel::Info, format!("Tracking mode: {:?}", mode));
                    }
                }
                Command::ResetFilters => self.filters.reset(),
            }
        }
    }

    fn handle_stall(&mut self) -> IterationOutcome {
        if self.watchdog.mark_lost() {
            self.events.emit(EngineEvent::CameraLost);
            self.events.log(LogLevel::Warn, "Camera lost, no frames received");
            self.set_status(TrackingStatus::CameraLost);
            self.cancel_calibration();
        }
        match self.watchdog.try_reconnect(&mut self.source) {
            Reconnect::Restored => {
                self.events.emit(EngineEvent::CameraRestored);
                self.events.log(LogLevel::Info, "Camera reconnected");
                IterationOutcome::Reconnecting
            }
            Reconnect::Failed { attempt } => {
                self.events.log(
                    LogLevel::Warn,
                    format!("Reconnect attempt {}/{} failed", attempt, self.watchdog.max_retries()),
                );
                IterationOutcome::Reconnecting
            }
            Reconnect::Exhausted => {
                self.camera_failed = true;
                self.set_status(TrackingStatus::CameraFailed);
                self.events.log(LogLevel::Error, "Camera failed, giving up after retries");
                IterationOutcome::CameraFailed
            }
        }
    }

    fn cancel_calibration(&mut self) {
        if let Some(event) = self.calibration.cancel() {
            self.calibration_percent = None;
            self.events.emit(EngineEvent::Calibration(event));
            self.events.log(LogLevel::Warn, "Calibration cancelled");
        }
    }

    fn advance_calibration(&mut self, now: Instant, pose: Option<&PoseLandmarks>) {
        if let Some(pose) = pose {
            self.calibration.observe_pose(now, pose);
        }
        let Some(event) = self.calibration.poll(now, self.mapper.shared()) else {
            return;
        };
        match event {
            CalibrationEvent::Progress { percent } => {
                if self.calibration_percent == Some(percent) {
                    return;
                }
                self.calibration_percent = Some(percent);
            }
            CalibrationEvent::Complete { scale, offset_y, .. } => {
                self.calibration_percent = None;
                self.mapper.refresh();
                self.filters.reset();
                self.events.log(
                    LogLevel::Info,
                    format!("Calibration complete: scale={:.2}, offset_y={:.2}", scale, offset_y),
                );
            }
            CalibrationEvent::Failed { reason } => {
                self.calibration_percent = None;
                self.events.log(LogLevel::Warn, format!("Calibration failed: {}", reason));
            }
            CalibrationEvent::Started => {}
        }
        self.events.emit(EngineEvent::Calibration(event));
    }

    /// Maps, filters and sends every enabled joint of this frame.
    fn dispatch(&mut self, t: f64, pose: Option<&PoseLandmarks>, hands: &[HandLandmarks]) {
        let mode = self.tracking.mode;
        let mut covered = [false; 2];

        for hand in hands {
            let joint = hand_joint(hand.handedness);
            let slot = self.trackers.slot(joint);
            if !mode.allows(joint) || !slot.enabled {
                continue;
            }
            if let Some(sample) = hand_landmark(hand) {
                let sent = send_joint(
                    &mut self.filters,
                    &self.mapper,
                    &mut self.sink,
                    slot,
                    hand_channel(hand.handedness),
                    t,
                    sample,
                );
                covered[(joint == Joint::RightHand) as usize] |= sent;
            }
        }

        let Some(pose) = pose else { return };
        for joint in Joint::ALL {
            if !mode.allows(joint) {
                continue;
            }
            let hand_covered = match joint {
                Joint::LeftHand => covered[0],
                Joint::RightHand => covered[1],
                _ => false,
            };
            let slot = self.trackers.slot(joint);
            if hand_covered || !slot.enabled {
                continue;
            }
            if let Some(sample) = joint.landmark(pose) {
                send_joint(
                    &mut self.filters,
                    &self.mapper,
                    &mut self.sink,
                    slot,
                    joint.channel(),
                    t,
                    sample,
                );
            }
        }
    }

    fn set_status(&mut self, status: TrackingStatus) {
        if self.status != Some(status) {
            self.status = Some(status);
            self.events.emit(EngineEvent::Status(status));
        }
    }
}

fn send_joint<K: UpdateSink>(
    filters: &mut FilterBank,
    mapper: &CoordinateMapper,
    sink: &mut K,
    slot: &TrackerSlot,
    channel: ChannelId,
    t: f64,
    sample: LandmarkSample,
) -> bool {
    if !sample.is_finite() {
        return false;
    }
    let Some(position) = filters.filter(channel, t, mapper.map(sample.x, sample.y, sample.z)) else {
        return false;
    };
    sink.send(&TrackerUpdate {
        index: slot.index,
        bone: &slot.bone,
        enabled: true,
        pose: TrackerPose::from_position(position),
    });
    true
}

/// Mean body visibility, else mean hand score, else zero.
fn frame_confidence(pose: Option<&PoseLandmarks>, hands: &[HandLandmarks]) -> f32 {
    match pose {
        Some(pose) => pose.average_visibility(),
        None if !hands.is_empty() => hands.iter().map(|h| h.score).sum::<f32>() / hands.len() as f32,
        None => 0.0,
    }
}

/// Controls a tracking loop running on its own thread
pub struct EngineHandle {
    running: Arc<AtomicBool>,
    commands: Sender<Command>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    transform: SharedTransform,
}

impl EngineHandle {
    /// Starts the worker. The transform starts from the configured calibration.
    pub fn spawn<S, E, K>(config: &Config, source: S, estimator: E, sink: K, events: EventSender) -> Result<Self>
    where
        S: FrameSource + Send + 'static,
        E: PoseEstimator<S::Frame> + Send + 'static,
        K: UpdateSink + Send + 'static,
    {
        let transform = SharedTransform::new(config.calibration.transform()?);
        let running = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let mut tracking = TrackingLoop::new(
            config,
            source,
            estimator,
            sink,
            transform.clone(),
            command_rx,
            events,
        );
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("tracking".to_string())
            .spawn(move || {
                tracking.run(&flag);
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            running,
            commands: command_tx,
            done: done_rx,
            thread: Some(thread),
            transform,
        })
    }

    /// False once the worker has exited.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn start_calibration(&self) -> bool {
        self.send(Command::StartCalibration)
    }

    pub fn transform(&self) -> &SharedTransform {
        &self.transform
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Blocks until `shutdown` is raised or the worker exits, starting a
    /// calibration each time `calibrate` is raised. Both flags are polled
    /// every `poll`, so they can be set from a signal handler.
    pub fn supervise(&self, shutdown: &AtomicBool, calibrate: &AtomicBool, poll: Duration) {
        while !shutdown.load(Ordering::Relaxed) && self.is_running() {
            if calibrate.swap(false, Ordering::Relaxed) && !self.start_calibration() {
                break;
            }
            thread::sleep(poll);
        }
    }

    /// Clears the running flag and waits up to `timeout` for the worker.
    /// Returns false if it did not finish in time; the thread is then detached.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.running.store(false, Ordering::Relaxed);
        let finished = match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        if let Some(thread) = self.thread.take() {
            if finished {
                if thread.join().is_err() {
                    tracing::error!("Tracking thread panicked");
                }
            } else {
                tracing::warn!("Tracking thread did not stop within {:?}", timeout);
            }
        }
        finished
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
