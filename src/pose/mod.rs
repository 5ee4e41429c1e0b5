pub mod landmark;

pub use landmark::{
    HandLandmarks, Handedness, LandmarkIndex, LandmarkSample, PoseLandmarks, HAND_LANDMARK_COUNT,
};

/// Vision model seam: turns one camera frame into landmark sets.
pub trait PoseEstimator<F> {
    /// Zero or one body landmark set.
    fn estimate_pose(&mut self, frame: &F) -> Option<PoseLandmarks>;

    /// Zero or more hand landmark sets, each tagged with handedness.
    fn estimate_hands(&mut self, frame: &F) -> Vec<HandLandmarks>;
}
