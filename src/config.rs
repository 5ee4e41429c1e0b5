use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::tracker::joints::{Joint, TrackingMode};
use crate::tracker::mapper::TransformState;
use crate::tracker::one_euro::FilterParams;
use crate::vmc::VMC_DEFAULT_ADDR;
use crate::vmt::VMT_DEFAULT_ADDR;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub trackers: TrackersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// VMT送信を有効化
    #[serde(default = "default_true")]
    pub use_vmt: bool,
    /// VMT送信先 (host:port)
    #[serde(default = "default_vmt_addr")]
    pub vmt_addr: String,
    /// VMC送信を有効化
    #[serde(default)]
    pub use_vmc: bool,
    /// VMC送信先 (host:port)
    #[serde(default = "default_vmc_addr")]
    pub vmc_addr: String,
}

fn default_true() -> bool { true }
fn default_vmt_addr() -> String { VMT_DEFAULT_ADDR.to_string() }
fn default_vmc_addr() -> String { VMC_DEFAULT_ADDR.to_string() }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            use_vmt: true,
            vmt_addr: default_vmt_addr(),
            use_vmc: false,
            vmc_addr: default_vmc_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// ランドマーク受信アドレス (host:port)
    #[serde(default = "default_feed_addr")]
    pub feed_addr: String,
    /// 1フレーム読み込みの待ち時間上限（ミリ秒）
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// 左右反転
    #[serde(default = "default_true")]
    pub flip_horizontal: bool,
}

fn default_feed_addr() -> String { "127.0.0.1:39600".to_string() }
fn default_read_timeout_ms() -> u64 { 100 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            feed_addr: default_feed_addr(),
            read_timeout_ms: default_read_timeout_ms(),
            flip_horizontal: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    #[serde(default)]
    pub mode: TrackingMode,
    /// 指トラッキング（ハンドパイプライン）を有効化
    #[serde(default)]
    pub use_fingers: bool,
    /// 姿勢の検出閾値
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    /// 検出済み姿勢の追跡継続閾値
    #[serde(default = "default_min_tracking_confidence")]
    pub min_tracking_confidence: f32,
    /// ハンド検出閾値
    #[serde(default = "default_hand_confidence")]
    pub hand_confidence: f32,
    /// 平滑化の強さ (0.0〜1.0)
    #[serde(default = "default_smooth_factor")]
    pub smooth_factor: f32,
    #[serde(default = "default_beta")]
    pub beta: f32,
    #[serde(default = "default_d_cutoff")]
    pub d_cutoff: f32,
}

fn default_min_detection_confidence() -> f32 { 0.77 }
fn default_min_tracking_confidence() -> f32 { 0.75 }
fn default_hand_confidence() -> f32 { 0.3 }
fn default_smooth_factor() -> f32 { 0.57 }
fn default_beta() -> f32 { 0.01 }
fn default_d_cutoff() -> f32 { 1.0 }

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            mode: TrackingMode::default(),
            use_fingers: false,
            min_detection_confidence: default_min_detection_confidence(),
            min_tracking_confidence: default_min_tracking_confidence(),
            hand_confidence: default_hand_confidence(),
            smooth_factor: default_smooth_factor(),
            beta: default_beta(),
            d_cutoff: default_d_cutoff(),
        }
    }
}

impl TrackingConfig {
    /// smooth_factorが大きいほどmin_cutoffが下がり、静止時の平滑化が強くなる
    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            min_cutoff: (1.5 * (1.1 - self.smooth_factor)).max(0.01),
            beta: self.beta,
            d_cutoff: self.d_cutoff,
        }
    }

    /// ハンドパイプラインを使うか
    pub fn uses_hand_pipeline(&self) -> bool {
        self.use_fingers || self.mode == TrackingMode::HandsOnly
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default = "default_offset_y")]
    pub offset_y: f32,
    #[serde(default = "default_offset_z")]
    pub offset_z: f32,
    /// 基準姿勢をとるまでの待ち時間（秒）。この間のサンプルは捨てる
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: f32,
    /// キャリブレーション全体の長さ（秒）
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f32,
    /// 頭〜足の身長（メートル）
    #[serde(default = "default_reference_height")]
    pub reference_height: f32,
    /// 頭の基準高さ（メートル）
    #[serde(default = "default_eye_height")]
    pub eye_height: f32,
    /// 正規化身長がこれ以下なら失敗扱い
    #[serde(default = "default_min_height_norm")]
    pub min_height_norm: f32,
}

fn default_scale() -> f32 { 1.191_294_9 }
fn default_offset_y() -> f32 { 1.0 }
fn default_offset_z() -> f32 { 1.0 }
fn default_warmup_secs() -> f32 { 3.0 }
fn default_duration_secs() -> f32 { 5.0 }
fn default_reference_height() -> f32 { 1.7 }
fn default_eye_height() -> f32 { 1.55 }
fn default_min_height_norm() -> f32 { 0.1 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            offset_x: 0.0,
            offset_y: default_offset_y(),
            offset_z: default_offset_z(),
            warmup_secs: default_warmup_secs(),
            duration_secs: default_duration_secs(),
            reference_height: default_reference_height(),
            eye_height: default_eye_height(),
            min_height_norm: default_min_height_norm(),
        }
    }
}

impl CalibrationConfig {
    pub fn transform(&self) -> Result<TransformState, ConfigError> {
        TransformState::new(self.scale, self.offset_x, self.offset_y, self.offset_z)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchdogConfig {
    /// フレームが途絶えたと判断するまでの秒数
    #[serde(default = "default_frame_timeout_secs")]
    pub frame_timeout_secs: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 再接続前の待ち時間（秒）
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f32,
}

fn default_frame_timeout_secs() -> f32 { 5.0 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_secs() -> f32 { 2.0 }

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            frame_timeout_secs: default_frame_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

/// 1トラッカー分の出力設定
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TrackerSlot {
    #[serde(default)]
    pub enabled: bool,
    /// VMTトラッカー番号
    pub index: i32,
    /// VMCボーン名
    pub bone: String,
}

impl TrackerSlot {
    fn new(enabled: bool, index: i32, bone: &str) -> Self {
        Self {
            enabled,
            index,
            bone: bone.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackersConfig {
    #[serde(default = "default_head")]
    pub head: TrackerSlot,
    #[serde(default = "default_waist")]
    pub waist: TrackerSlot,
    #[serde(default = "default_left_hand")]
    pub left_hand: TrackerSlot,
    #[serde(default = "default_right_hand")]
    pub right_hand: TrackerSlot,
    #[serde(default = "default_left_knee")]
    pub left_knee: TrackerSlot,
    #[serde(default = "default_right_knee")]
    pub right_knee: TrackerSlot,
    #[serde(default = "default_left_hip")]
    pub left_hip: TrackerSlot,
    #[serde(default = "default_right_hip")]
    pub right_hip: TrackerSlot,
    #[serde(default = "default_left_foot")]
    pub left_foot: TrackerSlot,
    #[serde(default = "default_right_foot")]
    pub right_foot: TrackerSlot,
}

fn default_head() -> TrackerSlot { TrackerSlot::new(true, 0, "Head") }
fn default_waist() -> TrackerSlot { TrackerSlot::new(true, 3, "Hips") }
fn default_left_hand() -> TrackerSlot { TrackerSlot::new(true, 1, "LeftHand") }
fn default_right_hand() -> TrackerSlot { TrackerSlot::new(true, 2, "RightHand") }
fn default_left_knee() -> TrackerSlot { TrackerSlot::new(false, 4, "LeftLowerLeg") }
fn default_right_knee() -> TrackerSlot { TrackerSlot::new(false, 5, "RightLowerLeg") }
fn default_left_hip() -> TrackerSlot { TrackerSlot::new(false, 6, "LeftUpperLeg") }
fn default_right_hip() -> TrackerSlot { TrackerSlot::new(false, 7, "RightUpperLeg") }
fn default_left_foot() -> TrackerSlot { TrackerSlot::new(false, 8, "LeftFoot") }
fn default_right_foot() -> TrackerSlot { TrackerSlot::new(false, 9, "RightFoot") }

impl Default for TrackersConfig {
    fn default() -> Self {
        Self {
            head: default_head(),
            waist: default_waist(),
            left_hand: default_left_hand(),
            right_hand: default_right_hand(),
            left_knee: default_left_knee(),
            right_knee: default_right_knee(),
            left_hip: default_left_hip(),
            right_hip: default_right_hip(),
            left_foot: default_left_foot(),
            right_foot: default_right_foot(),
        }
    }
}

impl TrackersConfig {
    pub fn slot(&self, joint: Joint) -> &TrackerSlot {
        match joint {
            Joint::Head => &self.head,
            Joint::Waist => &self.waist,
            Joint::LeftHand => &self.left_hand,
            Joint::RightHand => &self.right_hand,
            Joint::LeftKnee => &self.left_knee,
            Joint::RightKnee => &self.right_knee,
            Joint::LeftHip => &self.left_hip,
            Joint::RightHip => &self.right_hip,
            Joint::LeftFoot => &self.left_foot,
            Joint::RightFoot => &self.right_foot,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗した場合はデフォルト設定を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("{} not found, using default config", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using default config", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.transform()?;

        let t = &self.tracking;
        for (field, value) in [
            ("tracking.min_detection_confidence", t.min_detection_confidence),
            ("tracking.min_tracking_confidence", t.min_tracking_confidence),
            ("tracking.hand_confidence", t.hand_confidence),
            ("tracking.smooth_factor", t.smooth_factor),
            ("tracking.beta", t.beta),
            ("tracking.d_cutoff", t.d_cutoff),
        ] {
            finite(field, value)?;
        }
        if !(0.0..=1.0).contains(&t.smooth_factor) {
            return Err(invalid("tracking.smooth_factor", "must be within 0.0..=1.0"));
        }
        if t.d_cutoff <= 0.0 || t.beta < 0.0 {
            return Err(invalid("tracking.d_cutoff", "d_cutoff must be > 0 and beta >= 0"));
        }

        let c = &self.calibration;
        for (field, value) in [
            ("calibration.warmup_secs", c.warmup_secs),
            ("calibration.duration_secs", c.duration_secs),
            ("calibration.reference_height", c.reference_height),
            ("calibration.eye_height", c.eye_height),
            ("calibration.min_height_norm", c.min_height_norm),
        ] {
            finite(field, value)?;
        }
        if c.duration_secs <= 0.0 || c.warmup_secs < 0.0 || c.warmup_secs >= c.duration_secs {
            return Err(invalid(
                "calibration.warmup_secs",
                "warm-up must be >= 0 and shorter than duration_secs",
            ));
        }
        if c.reference_height <= 0.0 || c.min_height_norm <= 0.0 {
            return Err(invalid(
                "calibration.reference_height",
                "reference_height and min_height_norm must be > 0",
            ));
        }

        let w = &self.watchdog;
        finite("watchdog.frame_timeout_secs", w.frame_timeout_secs)?;
        finite("watchdog.retry_delay_secs", w.retry_delay_secs)?;
        if w.frame_timeout_secs <= 0.0 || w.retry_delay_secs < 0.0 {
            return Err(invalid(
                "watchdog.frame_timeout_secs",
                "frame timeout must be > 0 and retry delay >= 0",
            ));
        }
        Ok(())
    }
}

/// Seconds to `Duration`, falling back when the value does not fit.
pub(crate) fn secs_or(value: f32, fallback: Duration) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(fallback)
}

fn finite(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, "must be a finite number"))
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
