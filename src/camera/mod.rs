pub mod feed;
pub mod watchdog;

pub use feed::{FeedPacket, LandmarkFeed, PacketEstimator};
pub use watchdog::{CameraWatchdog, Reconnect};

use crate::error::CameraError;

/// A captured frame as handed to the vision model.
pub trait Frame {
    /// Mirror left/right in place.
    fn flip_horizontal(&mut self);
}

/// Camera-like producer of frames that can be released and reacquired.
pub trait FrameSource {
    type Frame: Frame;

    /// Blocks for at most the source's read timeout.
    fn read_frame(&mut self) -> Result<Self::Frame, CameraError>;

    fn release(&mut self);

    fn reacquire(&mut self) -> Result<(), CameraError>;
}
