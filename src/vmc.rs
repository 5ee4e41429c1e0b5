//! VMC protocol sender side.
//!
//! Trackers are addressed by bone name instead of a numeric index and sent as
//! calibrated tracker transforms (`/VMC/Ext/Tr/Cal`).

use rosc::{OscMessage, OscType};

use crate::vmt::TrackerPose;

/// Default VMC destination
pub const VMC_DEFAULT_ADDR: &str = "127.0.0.1:39580";

pub const VMC_TRACKER_CAL: &str = "/VMC/Ext/Tr/Cal";

/// Args: bone, reserved(0), x, y, z, qx, qy, qz, qw
pub fn build_osc_message(bone: &str, pose: &TrackerPose) -> OscMessage {
    OscMessage {
        addr: VMC_TRACKER_CAL.to_string(),
        args: vec![
            OscType::String(bone.to_string()),
            OscType::Int(0),
            OscType::Float(pose.position[0]),
            OscType::Float(pose.position[1]),
            OscType::Float(pose.position[2]),
            OscType::Float(pose.rotation[0]),
            OscType::Float(pose.rotation[1]),
            OscType::Float(pose.rotation[2]),
            OscType::Float(pose.rotation[3]),
        ],
    }
}
