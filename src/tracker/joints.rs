use serde::Deserialize;

use crate::pose::{HandLandmarks, Handedness, LandmarkIndex, LandmarkSample, PoseLandmarks};
use crate::tracker::one_euro::ChannelId;

/// Which estimation sub-pipelines and joints are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    FullBody,
    #[default]
    UpperBody,
    HandsOnly,
}

impl TrackingMode {
    /// ボディ推定を実行するか
    pub fn uses_pose(self) -> bool {
        !matches!(self, TrackingMode::HandsOnly)
    }

    pub fn allows(self, joint: Joint) -> bool {
        match self {
            TrackingMode::FullBody => true,
            TrackingMode::UpperBody => matches!(
                joint,
                Joint::Head | Joint::Waist | Joint::LeftHand | Joint::RightHand
            ),
            TrackingMode::HandsOnly => joint.is_hand(),
        }
    }
}

/// 出力トラッカーの部位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    Head,
    Waist,
    LeftHand,
    RightHand,
    LeftKnee,
    RightKnee,
    LeftHip,
    RightHip,
    LeftFoot,
    RightFoot,
}

impl Joint {
    pub const ALL: [Joint; 10] = [
        Joint::Head,
        Joint::Waist,
        Joint::LeftHand,
        Joint::RightHand,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftFoot,
        Joint::RightFoot,
    ];

    pub fn is_hand(self) -> bool {
        matches!(self, Joint::LeftHand | Joint::RightHand)
    }

    /// Filter slot fed from the body landmark set.
    pub fn channel(self) -> ChannelId {
        match self {
            Joint::Head => ChannelId(0),
            Joint::Waist => ChannelId(3),
            Joint::LeftHand => ChannelId(11),
            Joint::RightHand => ChannelId(12),
            Joint::LeftKnee => ChannelId(25),
            Joint::RightKnee => ChannelId(26),
            Joint::LeftHip => ChannelId(27),
            Joint::RightHip => ChannelId(28),
            Joint::LeftFoot => ChannelId(29),
            Joint::RightFoot => ChannelId(30),
        }
    }

    /// Body landmark position for this joint; the waist is the hip midpoint.
    pub fn landmark(self, pose: &PoseLandmarks) -> Option<LandmarkSample> {
        let single = |index| pose.get(index).copied();
        match self {
            Joint::Head => single(LandmarkIndex::Nose),
            Joint::Waist => {
                let left = pose.get(LandmarkIndex::LeftHip)?;
                let right = pose.get(LandmarkIndex::RightHip)?;
                Some(left.midpoint(right))
            }
            Joint::LeftHand => single(LandmarkIndex::LeftWrist),
            Joint::RightHand => single(LandmarkIndex::RightWrist),
            Joint::LeftKnee => single(LandmarkIndex::LeftKnee),
            Joint::RightKnee => single(LandmarkIndex::RightKnee),
            Joint::LeftHip => single(LandmarkIndex::LeftHip),
            Joint::RightHip => single(LandmarkIndex::RightHip),
            Joint::LeftFoot => single(LandmarkIndex::LeftAnkle),
            Joint::RightFoot => single(LandmarkIndex::RightAnkle),
        }
    }
}

/// ハンドパイプライン由来の手首チャンネル（ボディ由来とは別スロット）
pub fn hand_channel(handedness: Handedness) -> ChannelId {
    match handedness {
        Handedness::Left => ChannelId(40),
        Handedness::Right => ChannelId(41),
    }
}

pub fn hand_joint(handedness: Handedness) -> Joint {
    match handedness {
        Handedness::Left => Joint::LeftHand,
        Handedness::Right => Joint::RightHand,
    }
}

/// Wrist sample of a detected hand set.
pub fn hand_landmark(hand: &HandLandmarks) -> Option<LandmarkSample> {
    hand.wrist().copied()
}
