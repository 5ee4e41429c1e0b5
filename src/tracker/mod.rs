pub mod joints;
pub mod mapper;
pub mod one_euro;

pub use joints::{Joint, TrackingMode};
pub use mapper::{CoordinateMapper, SharedTransform, TransformState};
pub use one_euro::{ChannelId, ChannelState, FilterBank, FilterParams, CHANNEL_COUNT};
