//! Height calibration from an observed reference pose.
//!
//! The user stands still for a few seconds; the head-to-foot span seen by the
//! camera sets the scale, and the head height sets the vertical offset.

use std::time::{Duration, Instant};

use crate::config::{secs_or, CalibrationConfig};
use crate::events::{CalibrationEvent, CalibrationFailure};
use crate::pose::{LandmarkIndex, PoseLandmarks};
use crate::tracker::mapper::{SharedTransform, TransformState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParams {
    /// Samples before this are discarded while the user gets into position
    pub warmup: Duration,
    /// Total length of a run, warm-up included
    pub duration: Duration,
    /// Real head-to-foot height the observed span is mapped to (meters)
    pub reference_height: f32,
    /// Output height of the head after calibration (meters)
    pub eye_height: f32,
    pub min_height_norm: f32,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

impl CalibrationParams {
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            warmup: secs_or(config.warmup_secs, Duration::from_secs(3)),
            duration: secs_or(config.duration_secs, Duration::from_secs(5)),
            reference_height: config.reference_height,
            eye_height: config.eye_height,
            min_height_norm: config.min_height_norm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Sampling,
    Finalizing,
}

struct CalibrationSession {
    start_time: Instant,
    /// (head_y, mid_foot_y) in normalized image coordinates
    samples: Vec<(f32, f32)>,
}

/// Derives a new transform from sampled `(head_y, mid_foot_y)` pairs.
///
/// `offset_x` and `offset_z` are carried over from `current`.
pub fn compute_transform(
    samples: &[(f32, f32)],
    current: TransformState,
    params: &CalibrationParams,
) -> Result<TransformState, CalibrationFailure> {
    if samples.is_empty() {
        return Err(CalibrationFailure::NoSamples);
    }
    let n = samples.len() as f32;
    let mean_head_y = samples.iter().map(|s| s.0).sum::<f32>() / n;
    let mean_foot_y = samples.iter().map(|s| s.1).sum::<f32>() / n;

    let height_norm = mean_foot_y - mean_head_y;
    if !(height_norm > params.min_height_norm) {
        return Err(CalibrationFailure::DegenerateHeight(height_norm));
    }

    let scale = params.reference_height / height_norm;
    let offset_y = -(mean_head_y * scale - params.eye_height);
    let [offset_x, _, offset_z] = current.offset();
    TransformState::new(scale, offset_x, offset_y, offset_z)
        .map_err(|_| CalibrationFailure::DegenerateHeight(height_norm))
}

pub struct CalibrationController {
    params: CalibrationParams,
    state: CalibrationState,
    session: Option<CalibrationSession>,
}

impl CalibrationController {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            params,
            state: CalibrationState::Idle,
            session: None,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(CalibrationParams::from_config(config))
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != CalibrationState::Idle
    }

    pub fn sample_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.samples.len())
    }

    /// Begins a run. A second start while sampling is ignored.
    pub fn start(&mut self, now: Instant) -> Option<CalibrationEvent> {
        if self.state != CalibrationState::Idle {
            return None;
        }
        self.session = Some(CalibrationSession {
            start_time: now,
            samples: Vec::new(),
        });
        self.state = CalibrationState::Sampling;
        tracing::info!(
            "Calibration started (warm-up {:.1}s, total {:.1}s)",
            self.params.warmup.as_secs_f32(),
            self.params.duration.as_secs_f32()
        );
        Some(CalibrationEvent::Started)
    }

    /// Records one sample if `now` falls inside the sampling window.
    pub fn observe(&mut self, now: Instant, head_y: f32, mid_foot_y: f32) -> bool {
        if self.state != CalibrationState::Sampling || !head_y.is_finite() || !mid_foot_y.is_finite() {
            return false;
        }
        let (warmup, duration) = (self.params.warmup, self.params.duration);
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let elapsed = now.saturating_duration_since(session.start_time);
        if elapsed < warmup || elapsed >= duration {
            return false;
        }
        session.samples.push((head_y, mid_foot_y));
        true
    }

    /// Samples head (nose) height and the mean of both ankle heights.
    pub fn observe_pose(&mut self, now: Instant, pose: &PoseLandmarks) -> bool {
        let (Some(head), Some(left), Some(right)) = (
            pose.get(LandmarkIndex::Nose),
            pose.get(LandmarkIndex::LeftAnkle),
            pose.get(LandmarkIndex::RightAnkle),
        ) else {
            return false;
        };
        self.observe(now, head.y, (left.y + right.y) / 2.0)
    }

    /// Advances the run. Reports progress while sampling; once the window has
    /// elapsed, finalizes, writes the new transform on success and returns
    /// to idle. The transform is untouched on failure.
    pub fn poll(&mut self, now: Instant, transform: &SharedTransform) -> Option<CalibrationEvent> {
        if self.state != CalibrationState::Sampling {
            return None;
        }
        let session = self.session.as_ref()?;
        let elapsed = now.saturating_duration_since(session.start_time);
        if elapsed < self.params.duration {
            let ratio = elapsed.as_secs_f32() / self.params.duration.as_secs_f32();
            let percent = (ratio * 100.0).clamp(0.0, 99.0) as u8;
            return Some(CalibrationEvent::Progress { percent });
        }

        self.state = CalibrationState::Finalizing;
        let session = self.session.take()?;
        let result = compute_transform(&session.samples, transform.get(), &self.params);
        self.state = CalibrationState::Idle;

        match result {
            Ok(new_transform) => {
                transform.set(new_transform);
                let [offset_x, offset_y, offset_z] = new_transform.offset();
                tracing::info!(
                    "Calibration complete: scale={:.2}, offset_y={:.2} ({} samples)",
                    new_transform.scale(),
                    offset_y,
                    session.samples.len()
                );
                Some(CalibrationEvent::Complete {
                    scale: new_transform.scale(),
                    offset_x,
                    offset_y,
                    offset_z,
                })
            }
            Err(reason) => {
                tracing::warn!("Calibration failed: {}", reason);
                Some(CalibrationEvent::Failed { reason })
            }
        }
    }

    /// Aborts a running calibration without touching the transform.
    pub fn cancel(&mut self) -> Option<CalibrationEvent> {
        if self.state == CalibrationState::Idle {
            return None;
        }
        self.session = None;
        self.state = CalibrationState::Idle;
        Some(CalibrationEvent::Failed {
            reason: CalibrationFailure::Cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::test_support::standing_pose;

    fn shared(scale: f32, ox: f32, oy: f32, oz: f32) -> SharedTransform {
        SharedTransform::new(TransformState::new(scale, ox, oy, oz).unwrap())
    }

    fn at(start: Instant, secs: f32) -> Instant {
        start + Duration::from_secs_f32(secs)
    }

    /// 30fpsでサンプリング窓全体に同じ値を流す
    fn run(cal: &mut CalibrationController, t: &SharedTransform, head_y: f32, foot_y: f32) -> CalibrationEvent {
        let start = Instant::now();
        assert_eq!(cal.start(start), Some(CalibrationEvent::Started));
        let mut frame = 0;
        loop {
            let now = at(start, frame as f32 / 30.0);
            cal.observe(now, head_y, foot_y);
            match cal.poll(now, t) {
                Some(CalibrationEvent::Progress { .. }) => {}
                Some(done) => return done,
                None => panic!("calibration stalled"),
            }
            frame += 1;
        }
    }

    #[test]
    fn test_successful_calibration() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let t = shared(1.19, 0.25, 1.0, 1.0);
        let event = run(&mut cal, &t, 0.2, 0.9);

        let expected_scale = 1.7 / 0.7;
        let expected_offset_y = -(0.2 * expected_scale - 1.55);
        match event {
            CalibrationEvent::Complete { scale, offset_x, offset_y, offset_z } => {
                assert!((scale - 2.428571).abs() < 1e-4, "scale={}", scale);
                assert!((offset_y - 1.064286).abs() < 1e-4, "offset_y={}", offset_y);
                assert!((offset_y - expected_offset_y).abs() < 1e-4);
                assert_eq!(offset_x, 0.25);
                assert_eq!(offset_z, 1.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!((t.get().scale() - expected_scale).abs() < 1e-4);
        assert_eq!(cal.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_degenerate_height_leaves_transform_unchanged() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let t = shared(1.191_294_9, 0.0, 1.0, 1.0);
        let before = t.get();

        let event = run(&mut cal, &t, 0.40, 0.45);
        assert!(matches!(
            event,
            CalibrationEvent::Failed { reason: CalibrationFailure::DegenerateHeight(_) }
        ));

        let after = t.get();
        assert_eq!(after.scale().to_bits(), before.scale().to_bits());
        for (a, b) in after.offset().iter().zip(before.offset().iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert!(!cal.is_active());
    }

    #[test]
    fn test_inverted_pose_fails() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let t = shared(1.0, 0.0, 1.0, 1.0);
        let event = run(&mut cal, &t, 0.9, 0.2);
        assert!(matches!(event, CalibrationEvent::Failed { .. }));
        assert_eq!(t.get().scale(), 1.0);
    }

    #[test]
    fn test_no_samples_fails() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let t = shared(1.0, 0.0, 1.0, 1.0);
        let start = Instant::now();
        cal.start(start);
        let event = cal.poll(at(start, 5.0), &t);
        assert_eq!(
            event,
            Some(CalibrationEvent::Failed { reason: CalibrationFailure::NoSamples })
        );
    }

    #[test]
    fn test_warmup_samples_are_ignored() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let start = Instant::now();
        cal.start(start);
        assert!(!cal.observe(at(start, 0.5), 0.2, 0.9));
        assert!(!cal.observe(at(start, 2.99), 0.2, 0.9));
        assert!(cal.observe(at(start, 3.0), 0.2, 0.9));
        assert!(cal.observe(at(start, 4.9), 0.2, 0.9));
        assert!(!cal.observe(at(start, 5.0), 0.2, 0.9));
        assert_eq!(cal.sample_count(), 2);
    }

    #[test]
    fn test_only_window_samples_count() {
        // ウォームアップ中の異常値は平均に入らない
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let t = shared(1.0, 0.0, 0.0, 0.0);
        let start = Instant::now();
        cal.start(start);
        cal.observe(at(start, 1.0), 0.9, 0.1);
        cal.observe(at(start, 3.5), 0.2, 0.9);
        match cal.poll(at(start, 5.0), &t) {
            Some(CalibrationEvent::Complete { scale, .. }) => assert!((scale - 2.428571).abs() < 1e-4),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_start_is_not_reentrant() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let start = Instant::now();
        assert!(cal.start(start).is_some());
        cal.observe(at(start, 3.5), 0.2, 0.9);
        assert!(cal.start(at(start, 4.0)).is_none());
        // 2回目のstartでサンプルは消えない
        assert_eq!(cal.sample_count(), 1);
    }

    #[test]
    fn test_progress_reported_while_sampling() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let t = shared(1.0, 0.0, 0.0, 0.0);
        let start = Instant::now();
        cal.start(start);
        assert_eq!(cal.poll(at(start, 2.5), &t), Some(CalibrationEvent::Progress { percent: 50 }));
        assert_eq!(cal.state(), CalibrationState::Sampling);
    }

    #[test]
    fn test_poll_when_idle() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let t = shared(1.0, 0.0, 0.0, 0.0);
        assert_eq!(cal.poll(Instant::now(), &t), None);
    }

    #[test]
    fn test_cancel() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        assert!(cal.cancel().is_none());
        cal.start(Instant::now());
        assert!(matches!(
            cal.cancel(),
            Some(CalibrationEvent::Failed { reason: CalibrationFailure::Cancelled })
        ));
        assert!(!cal.is_active());
    }

    #[test]
    fn test_observe_pose() {
        let mut cal = CalibrationController::new(CalibrationParams::default());
        let start = Instant::now();
        cal.start(start);
        assert!(cal.observe_pose(at(start, 3.2), &standing_pose()));
        assert_eq!(cal.sample_count(), 1);
    }

    #[test]
    fn test_non_finite_window_falls_back() {
        let config = CalibrationConfig {
            warmup_secs: f32::NAN,
            duration_secs: f32::INFINITY,
            ..CalibrationConfig::default()
        };
        let params = CalibrationParams::from_config(&config);
        assert_eq!(params.warmup, Duration::ZERO);
        assert_eq!(params.duration, Duration::from_secs(5));
    }

    #[test]
    fn test_configurable_window() {
        let config = CalibrationConfig {
            warmup_secs: 0.0,
            duration_secs: 1.0,
            ..CalibrationConfig::default()
        };
        let mut cal = CalibrationController::from_config(&config);
        let start = Instant::now();
        cal.start(start);
        assert!(cal.observe(at(start, 0.1), 0.2, 0.9));
        assert!(!cal.observe(at(start, 1.0), 0.2, 0.9));
    }
}
