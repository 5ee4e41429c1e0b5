use std::sync::{Arc, RwLock};

use crate::error::ConfigError;

/// Scale and offset applied when mapping normalized camera coordinates to VR space.
///
/// `scale` is always finite and > 0 and offsets are finite; the only way to
/// build one is [`TransformState::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    offset_z: f32,
}

impl TransformState {
    pub fn new(scale: f32, offset_x: f32, offset_y: f32, offset_z: f32) -> Result<Self, ConfigError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::InvalidScale(scale));
        }
        if ![offset_x, offset_y, offset_z].iter().all(|o| o.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "offset".to_string(),
                message: format!("offsets must be finite, got ({}, {}, {})", offset_x, offset_y, offset_z),
            });
        }
        Ok(Self {
            scale,
            offset_x,
            offset_y,
            offset_z,
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> [f32; 3] {
        [self.offset_x, self.offset_y, self.offset_z]
    }

    /// Normalized (origin top-left, y down, z away from camera) to VR space
    /// (centered, y up, z toward the viewer).
    pub fn map(&self, x: f32, y: f32, z: f32) -> [f32; 3] {
        [
            (x - 0.5) * self.scale + self.offset_x,
            (0.5 - y) * self.scale + self.offset_y,
            self.offset_z - z * self.scale,
        ]
    }
}

/// Transform shared between the tracking worker and outside writers.
///
/// Reads and writes always move a whole `TransformState`, so a reader never
/// sees a new scale paired with an old offset.
#[derive(Debug, Clone)]
pub struct SharedTransform {
    inner: Arc<RwLock<TransformState>>,
}

impl SharedTransform {
    pub fn new(initial: TransformState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> TransformState {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, transform: TransformState) {
        match self.inner.write() {
            Ok(mut guard) => *guard = transform,
            Err(poisoned) => *poisoned.into_inner() = transform,
        }
    }

    /// Validating update for callers holding raw values (e.g. UI sliders).
    pub fn update(&self, scale: f32, offset_x: f32, offset_y: f32, offset_z: f32) -> Result<(), ConfigError> {
        let transform = TransformState::new(scale, offset_x, offset_y, offset_z)?;
        self.set(transform);
        Ok(())
    }
}

/// Maps landmarks with one transform snapshot per frame.
pub struct CoordinateMapper {
    shared: SharedTransform,
    snapshot: TransformState,
}

impl CoordinateMapper {
    pub fn new(shared: SharedTransform) -> Self {
        let snapshot = shared.get();
        Self { shared, snapshot }
    }

    /// Takes a fresh snapshot of the shared transform.
    pub fn refresh(&mut self) -> TransformState {
        self.snapshot = self.shared.get();
        self.snapshot
    }

    pub fn shared(&self) -> &SharedTransform {
        &self.shared
    }

    pub fn map(&self, x: f32, y: f32, z: f32) -> [f32; 3] {
        self.snapshot.map(x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_center_maps_to_offset() {
        for &(s, ox, oy, oz) in &[(1.0, 0.0, 0.0, 0.0), (1.19, 0.2, 1.0, 1.0), (3.5, -1.0, 2.0, -0.5)] {
            let t = TransformState::new(s, ox, oy, oz).unwrap();
            assert!(approx_eq(t.map(0.5, 0.5, 0.0), [ox, oy, oz]));
        }
    }

    #[test]
    fn test_axis_flip() {
        let t = TransformState::new(2.0, 0.0, 0.0, 0.0).unwrap();
        // 画像左上 → VR空間の左上（y上向き）
        assert!(approx_eq(t.map(0.0, 0.0, 0.0), [-1.0, 1.0, 0.0]));
        // z: カメラから遠ざかる → 手前が正
        assert!(approx_eq(t.map(0.5, 0.5, 0.25), [0.0, 0.0, -0.5]));
    }

    #[test]
    fn test_linear_in_scale() {
        let t1 = TransformState::new(1.0, 0.0, 0.0, 0.0).unwrap();
        let t3 = TransformState::new(3.0, 0.0, 0.0, 0.0).unwrap();
        let a = t1.map(0.8, 0.1, 0.3);
        let b = t3.map(0.8, 0.1, 0.3);
        assert!(approx_eq([a[0] * 3.0, a[1] * 3.0, a[2] * 3.0], b));
    }

    #[test]
    fn test_rejects_invalid_scale() {
        assert!(matches!(TransformState::new(0.0, 0.0, 0.0, 0.0), Err(ConfigError::InvalidScale(_))));
        assert!(matches!(TransformState::new(-2.0, 0.0, 0.0, 0.0), Err(ConfigError::InvalidScale(_))));
        assert!(TransformState::new(f32::NAN, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_rejects_non_finite_offsets() {
        assert!(matches!(
            TransformState::new(1.0, f32::NAN, 0.0, 0.0),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(TransformState::new(1.0, 0.0, f32::INFINITY, 0.0).is_err());
        assert!(TransformState::new(1.0, 0.0, 0.0, f32::NEG_INFINITY).is_err());

        let shared = SharedTransform::new(TransformState::new(1.5, 0.1, 0.2, 0.3).unwrap());
        assert!(shared.update(1.0, f32::NAN, 0.0, 0.0).is_err());
        assert_eq!(shared.get().offset(), [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_shared_update_keeps_previous_on_error() {
        let shared = SharedTransform::new(TransformState::new(1.5, 0.1, 0.2, 0.3).unwrap());
        assert!(shared.update(-1.0, 9.0, 9.0, 9.0).is_err());
        assert_eq!(shared.get(), TransformState::new(1.5, 0.1, 0.2, 0.3).unwrap());

        shared.update(2.0, 0.0, 1.0, 1.0).unwrap();
        assert_eq!(shared.get().scale(), 2.0);
    }

    #[test]
    fn test_mapper_uses_snapshot_until_refresh() {
        let shared = SharedTransform::new(TransformState::new(1.0, 0.0, 0.0, 0.0).unwrap());
        let mut mapper = CoordinateMapper::new(shared.clone());
        shared.update(2.0, 1.0, 1.0, 1.0).unwrap();
        assert!(approx_eq(mapper.map(0.5, 0.5, 0.0), [0.0, 0.0, 0.0]));
        mapper.refresh();
        assert!(approx_eq(mapper.map(0.5, 0.5, 0.0), [1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_shared_across_threads() {
        let shared = SharedTransform::new(TransformState::new(1.0, 0.0, 0.0, 0.0).unwrap());
        let writer = shared.clone();
        let handle = std::thread::spawn(move || {
            for i in 1..200 {
                let v = i as f32;
                writer.update(v, v, v, v).unwrap();
            }
        });
        for _ in 0..200 {
            let t = shared.get();
            let [ox, oy, oz] = t.offset();
            // 常にscaleとoffsetが同じ書き込みのもの
            assert!(t.scale() == 1.0 || (ox == t.scale() && oy == t.scale() && oz == t.scale()));
        }
        handle.join().unwrap();
    }
}
