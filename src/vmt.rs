use rosc::{encoder, OscMessage, OscPacket, OscType};

use crate::error::TransportError;

/// VMTのデフォルトアドレス
pub const VMT_DEFAULT_ADDR: &str = "127.0.0.1:39570";

/// VMTのOSCアドレス（ルーム座標・Unity座標系）
pub const VMT_ROOM_UNITY: &str = "/VMT/Room/Unity";

/// 回転なし
pub const IDENTITY_ROTATION: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// トラッカーの位置と回転
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerPose {
    /// 位置 (x, y, z)
    pub position: [f32; 3],
    /// 回転 (クォータニオン: x, y, z, w)
    pub rotation: [f32; 4],
}

impl TrackerPose {
    pub fn new(position: [f32; 3], rotation: [f32; 4]) -> Self {
        Self { position, rotation }
    }

    /// 位置のみ。姿勢推定は行わないので回転は常に単位クォータニオン
    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            rotation: IDENTITY_ROTATION,
        }
    }

    /// 原点、回転なし
    pub fn identity() -> Self {
        Self::from_position([0.0, 0.0, 0.0])
    }
}

/// VMTへ送信するOSCメッセージを構築
/// 引数: index, enable, timeoffset, x, y, z, qx, qy, qz, qw
pub fn build_osc_message(index: i32, enabled: bool, pose: &TrackerPose) -> OscMessage {
    OscMessage {
        addr: VMT_ROOM_UNITY.to_string(),
        args: vec![
            OscType::Int(index),
            OscType::Int(enabled as i32),
            OscType::Float(0.0), // timeoffset
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

/// OSCメッセージをバイト列にエンコード
pub fn encode_osc_message(msg: OscMessage) -> Result<Vec<u8>, TransportError> {
    encoder::encode(&OscPacket::Message(msg)).map_err(|e| TransportError::Encode(e.to_string()))
}
