use serde::Deserialize;

/// 33点ボディランドマークのインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;
}

/// ハンドランドマークの点数（0 = 手首）
pub const HAND_LANDMARK_COUNT: usize = 21;

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LandmarkSample {
    /// 正規化されたX座標 (0.0〜1.0, 左→右)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0, 上→下)
    pub y: f32,
    /// 奥行き（カメラから遠ざかると正）
    #[serde(default)]
    pub z: f32,
    /// 可視性スコア (0.0〜1.0)
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 { 1.0 }

impl LandmarkSample {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// 左右反転（正規化X座標を鏡映）
    pub fn mirrored(&self) -> Self {
        Self { x: 1.0 - self.x, ..*self }
    }

    /// 2点の中点。可視性は低い方を採用
    pub fn midpoint(&self, other: &Self) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z: (self.z + other.z) / 2.0,
            visibility: self.visibility.min(other.visibility),
        }
    }
}

impl Default for LandmarkSample {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: 0.0,
        }
    }
}

/// 1フレーム分のボディランドマーク
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PoseLandmarks {
    pub landmarks: Vec<LandmarkSample>,
    /// 姿勢全体の検出スコア
    #[serde(default = "default_visibility")]
    pub score: f32,
}

impl PoseLandmarks {
    pub fn new(landmarks: Vec<LandmarkSample>, score: f32) -> Self {
        Self { landmarks, score }
    }

    pub fn get(&self, index: LandmarkIndex) -> Option<&LandmarkSample> {
        self.landmarks.get(index as usize)
    }

    /// 全ランドマークの平均可視性
    pub fn average_visibility(&self) -> f32 {
        if self.landmarks.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / self.landmarks.len() as f32
    }

    pub fn is_complete(&self) -> bool {
        self.landmarks.len() == LandmarkIndex::COUNT && self.landmarks.iter().all(|l| l.is_finite())
    }

    pub fn mirror(&mut self) {
        for l in &mut self.landmarks {
            *l = l.mirrored();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// 1つの手のランドマーク
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandLandmarks {
    pub handedness: Handedness,
    #[serde(default = "default_visibility")]
    pub score: f32,
    pub landmarks: Vec<LandmarkSample>,
}

impl HandLandmarks {
    pub fn wrist(&self) -> Option<&LandmarkSample> {
        self.landmarks.first()
    }

    pub fn is_complete(&self) -> bool {
        self.landmarks.len() == HAND_LANDMARK_COUNT && self.landmarks.iter().all(|l| l.is_finite())
    }

    pub fn mirror(&mut self) {
        for l in &mut self.landmarks {
            *l = l.mirrored();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::test_support::standing_pose;

    #[test]
    fn test_landmark_index_count() {
        assert_eq!(LandmarkIndex::COUNT, 33);
        assert_eq!(LandmarkIndex::RightFootIndex as usize, 32);
        assert_eq!(LandmarkIndex::LeftHip as usize, 23);
    }

    #[test]
    fn test_pose_get() {
        let pose = standing_pose();
        let nose = pose.get(LandmarkIndex::Nose).unwrap();
        assert_eq!(nose.y, 0.2);
        assert!(pose.is_complete());
    }

    #[test]
    fn test_short_pose_is_incomplete() {
        let pose = PoseLandmarks::new(vec![LandmarkSample::default(); 17], 1.0);
        assert!(!pose.is_complete());
        assert!(pose.get(LandmarkIndex::LeftAnkle).is_none());
    }

    #[test]
    fn test_midpoint() {
        let a = LandmarkSample::new(0.4, 0.6, 0.2, 0.9);
        let b = LandmarkSample::new(0.6, 0.8, 0.0, 0.5);
        let m = a.midpoint(&b);
        assert!((m.x - 0.5).abs() < 1e-6);
        assert!((m.y - 0.7).abs() < 1e-6);
        assert!((m.z - 0.1).abs() < 1e-6);
        assert_eq!(m.visibility, 0.5);
    }

    #[test]
    fn test_mirror() {
        let mut pose = standing_pose();
        pose.mirror();
        assert!((pose.get(LandmarkIndex::LeftAnkle).unwrap().x - 0.55).abs() < 1e-6);
        assert_eq!(pose.get(LandmarkIndex::Nose).unwrap().y, 0.2);
    }

    #[test]
    fn test_average_visibility() {
        let pose = PoseLandmarks::new(vec![LandmarkSample::new(0.0, 0.0, 0.0, 0.5); 33], 1.0);
        assert!((pose.average_visibility() - 0.5).abs() < 0.001);
        assert_eq!(PoseLandmarks::new(vec![], 1.0).average_visibility(), 0.0);
    }

    #[test]
    fn test_deserialize_defaults() {
        let hand: HandLandmarks =
            serde_json::from_str(r#"{"handedness":"Left","landmarks":[{"x":0.1,"y":0.2}]}"#).unwrap();
        assert_eq!(hand.handedness, Handedness::Left);
        assert_eq!(hand.score, 1.0);
        assert_eq!(hand.wrist().unwrap().visibility, 1.0);
        assert_eq!(hand.wrist().unwrap().z, 0.0);
    }
}
